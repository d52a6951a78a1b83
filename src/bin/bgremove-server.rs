//! Background removal HTTP server
//!
//! Serves `POST /remove-bg` using the ONNX Runtime or Tract backend.

use bgremove_server::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
