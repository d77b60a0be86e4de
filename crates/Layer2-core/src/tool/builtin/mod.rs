//! Builtin tools
//!
//! | id            | policy | action       |
//! |---------------|--------|--------------|
//! | `run_command` | ask    | Execute      |
//! | `read_file`   | allow  | FileRead     |
//! | `write_file`  | ask    | FileWrite    |
//!
//! 모든 builtin 은 등록 시 비활성 상태이며 사용자가 활성화해야 한다.

mod command;
mod file;
mod sink;

pub use command::RunCommandTool;
pub use file::{ReadFileTool, WriteFileTool};
pub use sink::{
    CommandOutput, CommandRequest, CommandSink, FileSink, LocalCommandSink, LocalFileSink,
};

use super::{ToolDescriptor, ToolHandler, ToolRegistry};
use std::sync::Arc;
use toolforge_foundation::Result;

/// 모든 builtin 도구 (descriptor, handler)
pub fn all_tools(
    commands: Arc<dyn CommandSink>,
    files: Arc<dyn FileSink>,
) -> Vec<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    vec![
        (
            RunCommandTool::descriptor(),
            Arc::new(RunCommandTool::new(commands)) as Arc<dyn ToolHandler>,
        ),
        (
            ReadFileTool::descriptor(),
            Arc::new(ReadFileTool::new(Arc::clone(&files))),
        ),
        (WriteFileTool::descriptor(), Arc::new(WriteFileTool::new(files))),
    ]
}

pub fn register_builtins(
    registry: &ToolRegistry,
    commands: Arc<dyn CommandSink>,
    files: Arc<dyn FileSink>,
) -> Result<()> {
    for (descriptor, handler) in all_tools(commands, files) {
        registry.register(descriptor, Some(handler))?;
    }
    Ok(())
}
