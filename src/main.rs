use anyhow::Result;
use captcha_autofill::utils::logging;
use captcha_autofill::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load();

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
