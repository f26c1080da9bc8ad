//! 页面代理 - 基础设施层
//!
//! 向页面注入一段引导脚本（window.__acf），提供：
//! - 元素 token 分配与按 token 取回
//! - MutationObserver 记录排队，供 Rust 侧批量拉取
//! - 元素描述 / 指纹 / 快照 / 输入框查找等页面侧原语
//!
//! Rust 侧的 `PageAgent` 是这些原语的类型化封装，所有参数都经过
//! JSON 序列化后再拼入表达式，避免注入问题。

use anyhow::Result;

use crate::infrastructure::js_executor::JsExecutor;
use crate::models::element::ElementDescriptor;
use crate::models::mutation::MutationBatch;

/// 页面引导脚本，重复注入是幂等的
const PAGE_AGENT_JS: &str = r##"
(() => {
  if (window.__acf) { return true; }
  const state = {
    seq: 0,
    queue: [],
    els: new Map(),
    observer: null,
    selector: null,
  };

  const tag = (el) => {
    let token = el.__acfToken;
    if (!token) {
      token = 'e' + (++state.seq);
      el.__acfToken = token;
    }
    state.els.set(token, el);
    return token;
  };

  const get = (token) => {
    const el = state.els.get(token);
    if (!el || !el.isConnected) { return null; }
    return el;
  };

  const kindOf = (el) => {
    if (el instanceof HTMLImageElement) { return 'img'; }
    if (el instanceof HTMLCanvasElement) { return 'canvas'; }
    if (el instanceof SVGElement) { return 'svg'; }
    if (el instanceof HTMLElement && el.style && el.style.backgroundImage) { return 'div'; }
    return null;
  };

  const identOf = (el, kind) => {
    if (kind === 'img') {
      return (el.src || '') + (el.className || '') + (el.id || '') + (el.alt || '') +
        (el.getAttribute('data-src') || '');
    }
    if (kind === 'canvas') {
      return (el.className || '') + (el.id || '') + (el.getAttribute('data-type') || '');
    }
    if (kind === 'svg') {
      return ((el.className && el.className.baseVal) || '') + (el.id || '');
    }
    return (el.className || '') + (el.id || '');
  };

  const sizeOf = (el, kind) => {
    if (kind === 'img') {
      return [el.naturalWidth || el.width || 0, el.naturalHeight || el.height || 0];
    }
    if (kind === 'canvas') {
      return [el.width || 0, el.height || 0];
    }
    if (kind === 'svg') {
      return [
        el.clientWidth || parseInt(el.getAttribute('width') || '0', 10) || 0,
        el.clientHeight || parseInt(el.getAttribute('height') || '0', 10) || 0,
      ];
    }
    return [el.clientWidth || 0, el.clientHeight || 0];
  };

  const describe = (el) => {
    const kind = kindOf(el);
    if (!kind) { return null; }
    const size = sizeOf(el, kind);
    let matches = null;
    if (state.selector) {
      try { matches = el.matches(state.selector); } catch (e) { matches = false; }
    }
    return {
      token: tag(el),
      kind: kind,
      width: size[0],
      height: size[1],
      ident: identOf(el, kind),
      src: kind === 'img' ? (el.src || el.getAttribute('data-src') || null) : null,
      bg: (el.style && el.style.backgroundImage) || null,
      matchesSelector: matches,
    };
  };

  const collect = (root) => {
    const out = [];
    const push = (el) => {
      const d = describe(el);
      if (d) { out.push(d); }
    };
    if (root !== document && kindOf(root)) { push(root); }
    root.querySelectorAll('img').forEach(push);
    root.querySelectorAll('canvas').forEach(push);
    root.querySelectorAll('svg').forEach(push);
    root.querySelectorAll('div[style*="background"]').forEach(push);
    return out;
  };

  const fingerprintOf = (el, kind) => {
    if (kind === 'img') {
      return el.src + '_' + el.naturalWidth + '_' + el.naturalHeight;
    }
    if (kind === 'canvas') {
      try { return el.toDataURL(); } catch (e) { return 'canvas_' + Date.now(); }
    }
    if (kind === 'svg') { return el.outerHTML; }
    return (el.style && el.style.backgroundImage) || '';
  };

  const textLike = 'input[type="text"], input[type="password"], input:not([type])';

  const inputIdent = (input) => {
    return ((input.name || '') + (input.id || '') + (input.className || '') +
      (input.placeholder || '')).toLowerCase();
  };

  const keywordInput = (root, keywords) => {
    const inputs = root.querySelectorAll(textLike);
    for (const input of inputs) {
      const text = inputIdent(input);
      if (keywords.some((k) => text.includes(k))) { return input; }
    }
    return null;
  };

  const findInput = (el, keywords, inputSelector) => {
    if (inputSelector) {
      const direct = document.querySelector(inputSelector);
      if (direct) { return direct; }
    }
    const form = el.closest('form');
    if (form) {
      const hit = keywordInput(form, keywords);
      if (hit) { return hit; }
    }
    let parent = el.parentElement;
    for (let i = 0; i < 5 && parent; i++) {
      const hit = keywordInput(parent, keywords);
      if (hit) { return hit; }
      parent = parent.parentElement;
    }
    const rect = el.getBoundingClientRect();
    let closest = null;
    let minDistance = Infinity;
    for (const input of document.querySelectorAll(textLike)) {
      if (!keywords.some((k) => inputIdent(input).includes(k))) { continue; }
      const r = input.getBoundingClientRect();
      const d = Math.sqrt(Math.pow(r.left - rect.left, 2) + Math.pow(r.top - rect.top, 2));
      if (d < minDistance) { minDistance = d; closest = input; }
    }
    return closest;
  };

  const fire = (input) => {
    input.dispatchEvent(new Event('input', { bubbles: true }));
    input.dispatchEvent(new Event('change', { bubbles: true }));
  };

  const highlight = (input) => {
    const original = input.style.cssText;
    input.style.cssText += ';transition: all 0.3s ease;' +
      'box-shadow: 0 0 10px rgba(255, 105, 180, 0.8);border-color: #FF69B4 !important;';
    setTimeout(() => { input.style.cssText = original; }, 2000);
  };

  window.__acf = {
    configure(selector) {
      state.selector = selector || null;
      return true;
    },
    observe() {
      if (state.observer) { return true; }
      state.observer = new MutationObserver((mutations) => {
        for (const m of mutations) {
          m.addedNodes.forEach((node) => {
            if (node.nodeType === 1) { state.queue.push({ trigger: 'added', el: node }); }
          });
          if (m.type === 'attributes') {
            const el = m.target;
            if (el instanceof HTMLImageElement &&
                (m.attributeName === 'src' || m.attributeName === 'data-src')) {
              state.queue.push({ trigger: 'img-src', el: el });
            } else if (el instanceof HTMLCanvasElement) {
              state.queue.push({ trigger: 'canvas-attr', el: el });
            } else if (m.attributeName === 'style' && el.style && el.style.backgroundImage) {
              state.queue.push({ trigger: 'style-bg', el: el });
            }
          }
          if (m.type === 'childList' && m.target instanceof SVGElement) {
            state.queue.push({ trigger: 'svg-childlist', el: m.target });
          }
        }
      });
      state.observer.observe(document.body, {
        childList: true,
        subtree: true,
        attributes: true,
        attributeFilter: ['src', 'style', 'data-src', 'href'],
        characterData: true,
      });
      return true;
    },
    disconnect() {
      if (state.observer) {
        state.observer.disconnect();
        state.observer = null;
      }
      state.queue = [];
      return true;
    },
    drain() {
      const pending = state.queue.splice(0, state.queue.length);
      const records = [];
      for (const item of pending) {
        if (!item.el || !item.el.isConnected) { continue; }
        if (item.trigger === 'added') {
          for (const d of collect(item.el)) {
            records.push({ trigger: 'added', descriptor: d });
          }
        } else {
          const d = describe(item.el);
          if (d) { records.push({ trigger: item.trigger, descriptor: d }); }
        }
      }
      const alive = [];
      for (const [token, el] of state.els) {
        if (el.isConnected) { alive.push(token); } else { state.els.delete(token); }
      }
      return { records: records, alive: alive };
    },
    collectAll() {
      return collect(document);
    },
    canvases() {
      const out = [];
      document.querySelectorAll('canvas').forEach((el) => {
        const d = describe(el);
        if (d) { out.push(d); }
      });
      return out;
    },
    describe(token) {
      const el = get(token);
      return el ? describe(el) : null;
    },
    fingerprint(token) {
      const el = get(token);
      if (!el) { return null; }
      const kind = kindOf(el);
      return kind ? fingerprintOf(el, kind) : null;
    },
    async waitImage(token, timeoutMs) {
      const img = get(token);
      if (!img) { return false; }
      if (img.complete && img.naturalWidth > 0) { return true; }
      return await new Promise((resolve) => {
        const cleanup = () => {
          clearTimeout(timer);
          img.removeEventListener('load', onLoad);
          img.removeEventListener('error', onError);
        };
        const timer = setTimeout(() => { cleanup(); resolve(false); }, timeoutMs);
        const onLoad = () => { cleanup(); resolve(true); };
        const onError = () => { cleanup(); resolve(false); };
        img.addEventListener('load', onLoad);
        img.addEventListener('error', onError);
        if (img.complete && img.naturalWidth > 0) { cleanup(); resolve(true); }
      });
    },
    async nextFrame() {
      await new Promise((resolve) => requestAnimationFrame(resolve));
      return true;
    },
    snapshot(token) {
      const el = get(token);
      if (!el) { return null; }
      const kind = kindOf(el);
      if (kind === 'canvas') {
        try { return el.toDataURL('image/png'); } catch (e) { return null; }
      }
      if (kind === 'img') {
        if (!el.complete || !el.naturalWidth || !el.naturalHeight) { return null; }
        const canvas = document.createElement('canvas');
        canvas.width = el.naturalWidth;
        canvas.height = el.naturalHeight;
        const ctx = canvas.getContext('2d');
        ctx.fillStyle = '#FFFFFF';
        ctx.fillRect(0, 0, canvas.width, canvas.height);
        ctx.drawImage(el, 0, 0);
        try { return canvas.toDataURL('image/png'); } catch (e) { return null; }
      }
      return null;
    },
    async rasterizeSvg(token, timeoutMs) {
      const svg = get(token);
      if (!svg) { return null; }
      try {
        const markup = new XMLSerializer().serializeToString(svg);
        const blob = new Blob([markup], { type: 'image/svg+xml;charset=utf-8' });
        const url = URL.createObjectURL(blob);
        const img = new Image();
        img.src = url;
        const ok = await new Promise((resolve) => {
          const timer = setTimeout(() => resolve(false), timeoutMs);
          img.onload = () => { clearTimeout(timer); resolve(true); };
          img.onerror = () => { clearTimeout(timer); resolve(false); };
        });
        if (!ok) {
          URL.revokeObjectURL(url);
          return null;
        }
        const canvas = document.createElement('canvas');
        canvas.width = svg.clientWidth || 150;
        canvas.height = svg.clientHeight || 50;
        const ctx = canvas.getContext('2d');
        ctx.fillStyle = '#FFFFFF';
        ctx.fillRect(0, 0, canvas.width, canvas.height);
        ctx.drawImage(img, 0, 0);
        URL.revokeObjectURL(url);
        return canvas.toDataURL('image/png');
      } catch (e) {
        return null;
      }
    },
    async fetchDataUrl(url) {
      try {
        const resolved = new URL(url, location.href).href;
        const res = await fetch(resolved, { credentials: 'include' });
        if (!res.ok) { return null; }
        const blob = await res.blob();
        return await new Promise((resolve) => {
          const reader = new FileReader();
          reader.onload = () => resolve(reader.result);
          reader.onerror = () => resolve(null);
          reader.readAsDataURL(blob);
        });
      } catch (e) {
        return null;
      }
    },
    findInput(token, keywords, inputSelector) {
      const el = get(token);
      if (!el) { return null; }
      const input = findInput(el, keywords, inputSelector);
      return input ? tag(input) : null;
    },
    inputValue(token) {
      const input = get(token);
      return input ? (input.value || '') : null;
    },
    clearInput(token) {
      const input = get(token);
      if (!input) { return false; }
      input.value = '';
      fire(input);
      return true;
    },
    fillInput(token, text) {
      const input = get(token);
      if (!input) { return false; }
      input.value = text;
      fire(input);
      highlight(input);
      return true;
    },
    hostname() {
      return location.hostname;
    },
  };
  return true;
})()
"##;

/// 页面代理
///
/// 页面侧原语的类型化封装，Clone 后共享同一个 page
#[derive(Clone)]
pub struct PageAgent {
    executor: JsExecutor,
}

impl PageAgent {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &JsExecutor {
        &self.executor
    }

    /// 注入引导脚本并设置验证码选择器（可多次调用）
    pub async fn install(&self, captcha_selector: Option<&str>) -> Result<()> {
        self.executor.eval(PAGE_AGENT_JS).await?;
        let selector = serde_json::to_string(&captcha_selector)?;
        self.executor
            .eval(format!("window.__acf.configure({})", selector))
            .await?;
        Ok(())
    }

    /// 开始监听页面变更
    pub async fn observe(&self) -> Result<()> {
        self.executor.eval("window.__acf.observe()").await?;
        Ok(())
    }

    /// 停止监听并清空未拉取的记录
    pub async fn disconnect(&self) -> Result<()> {
        self.executor.eval("window.__acf.disconnect()").await?;
        Ok(())
    }

    /// 拉取一个变更批次（同时返回存活 token 全集）
    pub async fn drain(&self) -> Result<MutationBatch> {
        self.executor.eval_as("window.__acf.drain()").await
    }

    /// 全页扫描所有潜在候选元素
    pub async fn collect_all(&self) -> Result<Vec<ElementDescriptor>> {
        self.executor.eval_as("window.__acf.collectAll()").await
    }

    /// 所有 canvas 元素的当前描述（周期性复查用）
    pub async fn canvases(&self) -> Result<Vec<ElementDescriptor>> {
        self.executor.eval_as("window.__acf.canvases()").await
    }

    /// 重新读取指定元素的描述（元素已消失时返回 None）
    pub async fn describe(&self, token: &str) -> Result<Option<ElementDescriptor>> {
        self.executor
            .eval_as(format!("window.__acf.describe({})", js_str(token)?))
            .await
    }

    /// 计算指定元素的内容指纹
    pub async fn fingerprint(&self, token: &str) -> Result<Option<String>> {
        self.executor
            .eval_as(format!("window.__acf.fingerprint({})", js_str(token)?))
            .await
    }

    /// 等待图片加载完成（超时或加载失败返回 false）
    pub async fn wait_image(&self, token: &str, timeout_ms: u64) -> Result<bool> {
        self.executor
            .eval_as(format!(
                "window.__acf.waitImage({}, {})",
                js_str(token)?,
                timeout_ms
            ))
            .await
    }

    /// 等待一个渲染帧，让 canvas / svg / 背景图绘制完成
    pub async fn next_frame(&self) -> Result<()> {
        self.executor.eval("window.__acf.nextFrame()").await?;
        Ok(())
    }

    /// 导出元素像素快照（白底 PNG data URL）
    ///
    /// 元素消失、图片未加载或 canvas 被跨域污染时返回 None
    pub async fn snapshot(&self, token: &str) -> Result<Option<String>> {
        self.executor
            .eval_as(format!("window.__acf.snapshot({})", js_str(token)?))
            .await
    }

    /// 把 SVG 栅格化为白底 PNG data URL
    pub async fn rasterize_svg(&self, token: &str, timeout_ms: u64) -> Result<Option<String>> {
        self.executor
            .eval_as(format!(
                "window.__acf.rasterizeSvg({}, {})",
                js_str(token)?,
                timeout_ms
            ))
            .await
    }

    /// 在页面内以页面凭据下载图片（跨域代理能力），失败返回 None
    pub async fn fetch_data_url(&self, url: &str) -> Result<Option<String>> {
        self.executor
            .eval_as(format!("window.__acf.fetchDataUrl({})", js_str(url)?))
            .await
    }

    /// 按固定优先级查找候选元素的关联输入框，返回输入框 token
    pub async fn find_input(
        &self,
        token: &str,
        keywords: &[String],
        input_selector: Option<&str>,
    ) -> Result<Option<String>> {
        self.executor
            .eval_as(format!(
                "window.__acf.findInput({}, {}, {})",
                js_str(token)?,
                serde_json::to_string(keywords)?,
                serde_json::to_string(&input_selector)?
            ))
            .await
    }

    /// 读取输入框当前值（输入框已消失时返回 None）
    pub async fn input_value(&self, token: &str) -> Result<Option<String>> {
        self.executor
            .eval_as(format!("window.__acf.inputValue({})", js_str(token)?))
            .await
    }

    /// 清空输入框并派发 input / change 事件
    pub async fn clear_input(&self, token: &str) -> Result<bool> {
        self.executor
            .eval_as(format!("window.__acf.clearInput({})", js_str(token)?))
            .await
    }

    /// 填入文本、派发事件并短暂高亮
    pub async fn fill_input(&self, token: &str, text: &str) -> Result<bool> {
        self.executor
            .eval_as(format!(
                "window.__acf.fillInput({}, {})",
                js_str(token)?,
                js_str(text)?
            ))
            .await
    }

    /// 当前页面的 hostname
    pub async fn hostname(&self) -> Result<String> {
        self.executor.eval_as("window.__acf.hostname()").await
    }
}

/// 把 Rust 字符串编码为 JS 字符串字面量
fn js_str(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
