//! 浏览器集成测试
//!
//! 默认忽略，需要本机可用的 Chrome/Chromium 手动运行：
//! cargo test -- --ignored

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use captcha_autofill::browser::{connect_to_browser_and_page, launch_headless_browser};
use captcha_autofill::config::Config;
use captcha_autofill::infrastructure::{JsExecutor, PageAgent};
use captcha_autofill::models::events::EventBus;
use captcha_autofill::models::imaging::Tensor;
use captcha_autofill::services::ocr_runtime::OcrRuntime;
use captcha_autofill::services::{
    ChangeTracker, ElementClassifier, ImagePipeline, InputBinder, RecognitionEngine,
};
use captcha_autofill::utils::logging;
use captcha_autofill::workflow::{CandidateCtx, FlowResult, RecognizeFlow};

/// 返回固定索引序列的推理运行时替身
struct ScriptedRuntime {
    indices: Vec<i64>,
}

#[async_trait]
impl OcrRuntime for ScriptedRuntime {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }
    async fn load_model(&self, _model: &[u8]) -> Result<()> {
        Ok(())
    }
    async fn infer(&self, _tensor: &Tensor) -> Result<Vec<i64>> {
        Ok(self.indices.clone())
    }
}

/// 生成一张 120x40 的白底 PNG 并编码成 data URL
fn captcha_data_url() -> String {
    let mut rgba = image::RgbaImage::from_pixel(120, 40, image::Rgba([255, 255, 255, 255]));
    // 随手画几个黑块当作字符
    for x in 10..30 {
        for y in 10..30 {
            rgba.put_pixel(x, y, image::Rgba([0, 0, 0, 255]));
        }
    }
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", BASE64.encode(&png))
}

#[tokio::test]
#[ignore]
async fn test_browser_connection() {
    logging::init();

    let config = Config::from_env();

    let result = connect_to_browser_and_page(config.browser_debug_port, None, None).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_page_agent_collect() {
    logging::init();

    let (_browser, page) = launch_headless_browser(None, None)
        .await
        .expect("启动无头浏览器失败");
    page.set_content(
        r#"<html><body>
            <img id="captcha-img" src="about:blank" width="100" height="40">
            <canvas id="vcode" width="120" height="40"></canvas>
        </body></html>"#,
    )
    .await
    .expect("设置页面内容失败");

    let agent = PageAgent::new(JsExecutor::new(page));
    agent.install(None).await.expect("注入页面代理失败");

    let descriptors = agent.collect_all().await.expect("全页扫描失败");
    println!("找到 {} 个潜在元素", descriptors.len());
    assert!(descriptors.len() >= 2);
}

/// 端到端：启发式命中 → 首次出现视为变化 → 识别 "3kx9" →
/// 同 form 内解析输入框 → 填充并且 input/change 各触发一次
#[tokio::test]
#[ignore]
async fn test_end_to_end_fill() {
    logging::init();

    let (_browser, page) = launch_headless_browser(None, None)
        .await
        .expect("启动无头浏览器失败");

    let html = format!(
        r#"<html><body>
            <form>
                <img class="captcha-img" src="{}">
                <input type="text" name="captcha_code">
            </form>
            <script>
                window.inputCount = 0;
                window.changeCount = 0;
                const input = document.querySelector('input[name="captcha_code"]');
                input.addEventListener('input', () => window.inputCount++);
                input.addEventListener('change', () => window.changeCount++);
            </script>
        </body></html>"#,
        captcha_data_url()
    );
    page.set_content(html).await.expect("设置页面内容失败");

    let agent = PageAgent::new(JsExecutor::new(page));
    agent.install(None).await.expect("注入页面代理失败");

    // 字符集 ["", 3, k, x, 9]，脚本化输出折叠后应得 "3kx9"
    let runtime = Arc::new(ScriptedRuntime {
        indices: vec![1, 1, 0, 2, 2, 0, 3, 0, 4, 4],
    });
    let charsets: Vec<String> = ["", "3", "k", "x", "9"].iter().map(|c| c.to_string()).collect();

    let config = Config::default();
    let engine = RecognitionEngine::new(runtime, charsets).unwrap();
    let flow = RecognizeFlow::new(
        ElementClassifier::new(&config),
        Arc::new(ChangeTracker::new()),
        ImagePipeline::new(),
        engine,
        InputBinder::new(&config),
        EventBus::default(),
        Arc::new(AtomicBool::new(false)),
    );

    let descriptors = agent.collect_all().await.expect("全页扫描失败");
    let candidate = descriptors
        .iter()
        .find(|d| d.ident.contains("captcha-img"))
        .expect("应该找到验证码图片");

    let ctx = CandidateCtx::new(&candidate.token, candidate.kind, "sweep");
    let result = flow
        .run(&agent, candidate, &ctx)
        .await
        .expect("识别流程失败");
    assert_eq!(result, FlowResult::Recognized);

    let value: String = agent
        .executor()
        .eval_as("document.querySelector('input[name=\"captcha_code\"]').value")
        .await
        .expect("读取输入框失败");
    assert_eq!(value, "3kx9");

    let input_count: u32 = agent
        .executor()
        .eval_as("window.inputCount")
        .await
        .expect("读取计数失败");
    let change_count: u32 = agent
        .executor()
        .eval_as("window.changeCount")
        .await
        .expect("读取计数失败");
    assert_eq!(input_count, 1, "input 事件应当恰好触发一次");
    assert_eq!(change_count, 1, "change 事件应当恰好触发一次");

    // 内容未变化时第二次不再识别
    let second = flow
        .run(&agent, candidate, &ctx)
        .await
        .expect("识别流程失败");
    assert_eq!(second, FlowResult::Skipped);
}
