use anyhow::Result;
use clap::Parser;
use pfda_uploader::commands::{self, Cli};
use pfda_uploader::config::{AppConfig, Credentials};
use pfda_uploader::logging;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置，命令行参数优先
    let mut config = AppConfig::load_or_default(cli.config_path()).await;
    cli.apply_overrides(&mut config);

    // 守卫需要存活到程序结束
    let _log_guard = logging::init_logging(&config.log);

    info!(
        "pfda-uploader v{} 启动: server={}",
        env!("CARGO_PKG_VERSION"),
        config.service.base_url()
    );

    commands::run(cli, config, &Credentials::default_path()).await
}
