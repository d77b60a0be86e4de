//! Tool System - 도구 카탈로그와 실행 핸들러
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ToolRegistry                                                │
//! │  ├── register(descriptor, handler) - 도구 등록               │
//! │  ├── lookup(id | name) - 조회 (process 도구 우선)            │
//! │  ├── set_enabled(id, bool) - 활성화 + 영속화                 │
//! │  └── schemas(format) - consumer 별 스키마                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ToolHandler 구현                                            │
//! │  ├── builtin: run_command / read_file / write_file          │
//! │  ├── UserCommandTool - 설정 기반 command template           │
//! │  └── ProcessToolHandler - tools/call 왕복                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SchemaTranslator / Validator / ToolSync                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod builtin;
mod descriptor;
mod handler;
mod process;
mod registry;
mod schema;
mod user;
mod validator;

pub use descriptor::{ToolDescriptor, ToolOrigin};
pub use handler::{FnHandler, ToolHandler};
pub use process::{ProcessToolHandler, ToolSync};
pub use registry::{ResolvedTool, ToolRegistry, TOOL_STATE_KEY};
pub use schema::{SchemaFormat, SchemaTranslator};
pub use user::{render_template, UserCommandTool};
pub use validator::{JsonSchemaValidator, NoopValidator, Validator};

pub use builtin::{
    register_builtins, CommandSink, FileSink, LocalCommandSink, LocalFileSink, ReadFileTool,
    RunCommandTool, WriteFileTool,
};
