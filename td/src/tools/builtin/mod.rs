//! The standard tool set dispatched to agent loops (§4.2).

mod ask_user;
mod complete_task;
mod edit_file;
mod glob;
mod grep;
mod list_directory;
mod read_file;
mod run_command;
mod update_plan_step;
mod write_file;

pub use ask_user::AskUserTool;
pub use complete_task::CompleteTaskTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use update_plan_step::UpdatePlanStepTool;
pub use write_file::WriteFileTool;
