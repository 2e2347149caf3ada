//! IMG.LY Segmentation API Server
//!
//! Serves `POST /api/segment`, which fetches an image by URL, removes its
//! background with the RMBG-1.4 model and stores the result as PNG.

#[cfg(feature = "cli")]
use imgly_segment_api::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
