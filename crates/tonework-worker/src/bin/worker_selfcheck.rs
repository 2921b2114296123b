use std::path::{Path, PathBuf};

use tonework_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;
    let tool = config.tool.build_from_env();

    let work_dir = config.work_dir.clone().unwrap_or_else(std::env::temp_dir);
    println!(
        "worker-selfcheck: starting with tool={} work_dir={}",
        tool.name(),
        work_dir.display()
    );
    ensure_workdir(&work_dir).await?;
    ensure_binary(tool.binary())?;
    ensure_env_present(&["MINIO_ACCESS_KEY", "MINIO_SECRET_KEY"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe: PathBuf = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_binary(binary: &str) -> anyhow::Result<()> {
    let path = which::which(binary).map_err(|e| anyhow::anyhow!("{} not available: {}", binary, e))?;
    println!("worker-selfcheck: {} -> {}", binary, path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
