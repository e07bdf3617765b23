// sshhoney - SSH 蜜罐
// 程序入口

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod constants;
mod models;
mod services;
mod ssh;

use services::storage;
use ssh::{AuditLogger, HoneypotServer};

/// SSH 蜜罐：记录所有认证尝试与会话行为
#[derive(Parser, Debug)]
#[command(name = "sshhoney", version, about)]
struct Args {
    /// YAML 配置文件，未指定时使用默认配置
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 数据目录（存放生成的主机密钥）
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // 初始化诊断日志，输出到 stderr，审计日志另行输出
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug sshhoney
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = storage::load_config(args.config.as_deref())?;
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => storage::default_data_dir()?,
    };
    let setup = storage::resolve(config, &data_dir)?;

    let logger =
        Arc::new(AuditLogger::from_config(&setup.config.logging).context("无法初始化审计日志")?);
    let server = HoneypotServer::new(&setup.config, setup.host_keys, logger);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ssh-worker")
        .build()
        .context("无法创建 Tokio 运行时")?;

    runtime.block_on(server.run())?;
    Ok(())
}
