use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到浏览器并定位目标页面
///
/// 按 URL 片段或标题片段查找已打开的页面；都没匹配时使用
/// 第一个页面，一个页面都没有时创建空白页。
pub async fn connect_to_browser_and_page(
    port: u16,
    url_fragment: Option<&str>,
    title_fragment: Option<&str>,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!(
        "目标 URL 片段: {:?}, 目标标题片段: {:?}",
        url_fragment, title_fragment
    );

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    // 优先按 URL 片段匹配
    if let Some(fragment) = url_fragment.filter(|f| !f.is_empty()) {
        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if url.contains(fragment) {
                    info!("✓ 找到目标页面: {}", url);
                    return Ok((browser, page.clone()));
                }
            }
        }
        debug!("没有页面的 URL 包含 '{}'", fragment);
    }

    // 其次按标题片段匹配
    if let Some(fragment) = title_fragment.filter(|f| !f.is_empty()) {
        for page in pages.iter() {
            if let Ok(Some(title)) = page.get_title().await {
                debug!("检查页面标题: {}", title);
                if title.contains(fragment) {
                    info!("✓ 找到目标页面: {}", title);
                    return Ok((browser, page.clone()));
                }
            }
        }
        debug!("没有页面的标题包含 '{}'", fragment);
    }

    // 落到第一个已打开的页面
    if let Some(page) = pages.into_iter().next() {
        if let Ok(Some(url)) = page.url().await {
            info!("使用第一个页面: {}", url);
        }
        return Ok((browser, page));
    }

    debug!("浏览器没有打开任何页面，创建空白页面");
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建空白页面失败: {}", e);
        e
    })?;

    Ok((browser, page))
}
