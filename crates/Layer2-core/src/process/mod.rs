//! Process layer - provider 프로세스 감독 및 요청 다중화
//!
//! ```text
//!  ProcessSupervisor
//!   ├── ManagedProcess (server id 당 하나)
//!   │     ├── monitor task ── child.wait() ──► handle_exit ──► RestartPolicy
//!   │     ├── stdout ──► RequestMultiplexer.feed ──► pending / notifications
//!   │     └── stderr ──► debug log
//!   └── EventBus ◄── Started / Exited / Restarting / Notification ...
//! ```

mod multiplexer;
mod protocol;
mod restart;
mod supervisor;

pub use multiplexer::RequestMultiplexer;
pub use protocol::{Inbound, Notification, Request, RequestTimeouts, TOOLS_CALL, TOOLS_LIST};
pub use restart::{RefuseReason, RestartDecision, RestartPolicy};
pub use supervisor::{ProcessSnapshot, ProcessSpec, ProcessStatus, ProcessSupervisor};
