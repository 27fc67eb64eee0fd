//! 影像诊断后台主程序

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use medimg_core::{AppConfig, Repository};
use medimg_database::{DatabasePool, MemoryRepository, PgRepository};
use medimg_web::{AppState, WebServer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "medimg-server")]
#[command(about = "Servidor del panel de diagnóstico por imágenes médicas")]
struct Args {
    /// 监听端口（覆盖配置）
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（覆盖配置，EnvFilter 语法）
    #[arg(short, long)]
    log_level: Option<String>,

    /// 使用内存存储，不连接数据库（仅开发）
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // 日志尚未初始化
            eprintln!("Configuración inválida: {}", e);
            return Err(e.into());
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 初始化日志
    let level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("启动影像诊断后台...");
    info!("  监听地址: {}", config.bind_address());
    info!("  AI 模型: {}", config.ai.model);

    let repo: Arc<dyn Repository> = if args.in_memory {
        warn!("Using in-memory store, data is lost on restart");
        Arc::new(MemoryRepository::new())
    } else {
        let Some(url) = config.database.url.as_deref() else {
            bail!("database.url no está configurada (MEDIMG_DATABASE__URL) y no se usó --in-memory");
        };
        let pool = DatabasePool::connect(url, config.database.max_connections)
            .await
            .context("no se pudo conectar a PostgreSQL")?;
        let repo = PgRepository::new(pool);
        repo.create_tables().await.context("no se pudo preparar el esquema")?;
        Arc::new(repo)
    };

    let state = AppState::from_config(&config, repo)?;
    let server = WebServer::new(&config.server, state)?;

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
