use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::traits::TaskFn;
use taskweave_core::types::{Attributes, TaskInput};

/// Input key naming a file whose contents become the start output.
pub const FILE_KEY: &str = "file";

/// Task body for Start tasks.
///
/// The output is the resolved input. When it names a `file`, the path is
/// replaced by the file contents; a missing file fails the task.
pub fn start_runner() -> TaskFn {
    Arc::new(|input: TaskInput| -> Result<Attributes> {
        let mut output = input.data;
        if let Some(Value::String(path)) = output.get(FILE_KEY).cloned() {
            if !Path::new(&path).exists() {
                error!(node_id = input.node_id, path = %path, "File does not exist");
                return Err(TaskweaveError::execution(
                    input.node_id,
                    format!("file does not exist: {}", path),
                ));
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| TaskweaveError::execution(input.node_id, format!("{}: {}", path, e)))?;
            info!(node_id = input.node_id, path = %path, bytes = content.len(), "Loaded start file");
            output.insert(FILE_KEY.into(), Value::String(content));
        }
        Ok(output)
    })
}
