//! Built-in `save_content_to_file` tool: persists text to a new artifact.

use serde_json::{json, Value};

use crate::tools::{handler, str_arg, ToolBox, ToolContext, ToolMeta};

pub const NAME: &str = "save_content_to_file";

/// Save `content` to a new artifact file.
///
/// Args: `{ "content": "…", "file_extension?": "txt" }`
/// Returns the absolute path of the new file.
pub async fn save_content_to_file(ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
    let content = str_arg(&args, NAME, "content")?;
    let ext = args
        .get("file_extension")
        .and_then(Value::as_str)
        .unwrap_or("txt");

    let path = ctx.new_artifact_path(ext)?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| anyhow::anyhow!("{NAME}: cannot write {}: {e}", path.display()))?;

    tracing::info!(path = %path.display(), bytes = content.len(), "content saved");
    Ok(Value::String(path.to_string_lossy().into_owned()))
}

pub fn register(tb: &mut ToolBox) {
    tb.register(
        ToolMeta {
            name: NAME.into(),
            description: "Save text content (for example a Python script or JSON data) to a new file and return its absolute path.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The text to save."
                    },
                    "file_extension": {
                        "type": "string",
                        "description": "Extension of the new file, e.g. \"py\" or \"json\". Default: \"txt\"."
                    }
                },
                "required": ["content"],
                "additionalProperties": false
            }),
        },
        handler(|args, ctx| async move { save_content_to_file(&ctx, args).await }),
    );
}
