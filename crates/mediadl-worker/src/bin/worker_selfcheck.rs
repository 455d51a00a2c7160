use std::path::Path;

use mediadl_media::check_tool;
use mediadl_worker::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env();

    println!(
        "worker-selfcheck: starting with storage_dir={}",
        config.storage_dir.display()
    );
    ensure_storage_dir(&config.storage_dir).await?;

    let tools = [
        ("yt-dlp", &config.tools.ytdlp),
        ("ffmpeg", &config.tools.ffmpeg),
        ("ffprobe", &config.tools.ffprobe),
        ("imagemagick", &config.tools.imagemagick),
    ];
    for (name, program) in tools {
        let resolved = check_tool(program)
            .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
        println!("worker-selfcheck: {} -> {}", name, resolved.display());
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_storage_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;

    // Workers must be able to write into it
    let marker = path.join(".selfcheck");
    tokio::fs::write(&marker, b"ok").await?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}
