use regex::Regex;
use serde::Deserialize;
use tracing::warn;

/// 内置验证码关键词（元素属性与输入框属性均使用同一份）
pub const CAPTCHA_KEYWORDS: &[&str] = &[
    "captcha",
    "verify",
    "code",
    "vcode",
    "authcode",
    "验证码",
    "checkcode",
    "yzm",
    "capimg",
    "signcaptcha",
];

/// 候选元素尺寸下限/上限（像素）
pub const MIN_CAPTCHA_WIDTH: u32 = 40;
pub const MIN_CAPTCHA_HEIGHT: u32 = 20;
pub const MAX_CAPTCHA_WIDTH: u32 = 500;
pub const MAX_CAPTCHA_HEIGHT: u32 = 200;

/// 默认模型镜像列表（按顺序尝试，任一成功即停止）
pub const MODEL_MIRRORS: &[&str] = &[
    "https://raw.githubusercontent.com",
    "https://ghproxy.com/https://raw.githubusercontent.com",
    "https://ghfast.top/https://raw.githubusercontent.com",
    "https://mirror.ghproxy.com/https://raw.githubusercontent.com",
    "https://raw.kkgithub.com",
    "https://github.moeyy.xyz/https://raw.githubusercontent.com",
];

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否自行启动无头浏览器（false 表示连接已有浏览器）
    pub launch_headless: bool,
    /// 无头模式下使用的浏览器可执行文件路径
    pub chrome_executable: String,
    /// 目标页面 URL 片段（为空则使用第一个页面）
    pub target_url: String,
    /// 目标页面标题片段
    pub target_title: String,
    /// 是否启用自动检测
    pub auto_detect: bool,
    /// 验证码元素选择器（非空时跳过启发式判断）
    pub captcha_selector: String,
    /// 验证码输入框选择器（非空时优先使用）
    pub input_selector: String,
    /// 追加的验证码关键词（内置列表之外）
    pub extra_keywords: Vec<String>,
    /// 候选元素尺寸范围
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// canvas 周期性复查间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 变更批次拉取间隔（毫秒）
    pub drain_interval_ms: u64,
    /// 是否启用站点白名单
    pub enable_whitelist: bool,
    /// 白名单（hostname 通配符，如 "*.example.com"）
    pub whitelist: Vec<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 模型下载配置 ---
    pub model_mirrors: Vec<String>,
    pub model_repo: String,
    pub model_branch: String,
    pub model_path: String,
    pub charsets_path: String,
    pub model_version: String,
    pub model_cache_dir: String,
    pub cache_duration_days: i64,
    /// 模型自动下载开关（关闭时只使用本地缓存）
    pub auto_download: bool,
    // --- OCR 推理运行时配置 ---
    pub ocr_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            launch_headless: false,
            chrome_executable: String::new(),
            target_url: String::new(),
            target_title: String::new(),
            auto_detect: true,
            captcha_selector: String::new(),
            input_selector: String::new(),
            extra_keywords: Vec::new(),
            min_width: MIN_CAPTCHA_WIDTH,
            min_height: MIN_CAPTCHA_HEIGHT,
            max_width: MAX_CAPTCHA_WIDTH,
            max_height: MAX_CAPTCHA_HEIGHT,
            poll_interval_ms: 2000,
            drain_interval_ms: 250,
            enable_whitelist: false,
            whitelist: Vec::new(),
            verbose_logging: false,
            model_mirrors: MODEL_MIRRORS.iter().map(|m| m.to_string()).collect(),
            model_repo: "MakotoArai-CN/ddddocr-webjs".to_string(),
            model_branch: "main".to_string(),
            model_path: "public/common.onnx".to_string(),
            charsets_path: "public/charsets.json".to_string(),
            model_version: "1.0.2".to_string(),
            model_cache_dir: ".captcha_autofill_cache".to_string(),
            cache_duration_days: 30,
            auto_download: true,
            ocr_endpoint: "http://127.0.0.1:18700".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：CAPTCHA_CONFIG 指向 TOML 文件时先读文件，环境变量仍可覆盖
    pub fn load() -> Self {
        let base = match std::env::var("CAPTCHA_CONFIG") {
            Ok(path) => match Self::from_toml_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("⚠️ 读取配置文件 {} 失败: {}，使用默认配置", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        Self::overlay_env(base)
    }

    pub fn from_env() -> Self {
        Self::overlay_env(Self::default())
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn overlay_env(base: Self) -> Self {
        Self {
            browser_debug_port: env_parse("CAPTCHA_BROWSER_PORT", base.browser_debug_port),
            launch_headless: env_parse("CAPTCHA_LAUNCH_HEADLESS", base.launch_headless),
            chrome_executable: env_string("CAPTCHA_CHROME_EXECUTABLE", base.chrome_executable),
            target_url: env_string("CAPTCHA_TARGET_URL", base.target_url),
            target_title: env_string("CAPTCHA_TARGET_TITLE", base.target_title),
            auto_detect: env_parse("CAPTCHA_AUTO_DETECT", base.auto_detect),
            captcha_selector: env_string("CAPTCHA_SELECTOR", base.captcha_selector),
            input_selector: env_string("CAPTCHA_INPUT_SELECTOR", base.input_selector),
            extra_keywords: env_list("CAPTCHA_EXTRA_KEYWORDS", base.extra_keywords),
            min_width: env_parse("CAPTCHA_MIN_WIDTH", base.min_width),
            min_height: env_parse("CAPTCHA_MIN_HEIGHT", base.min_height),
            max_width: env_parse("CAPTCHA_MAX_WIDTH", base.max_width),
            max_height: env_parse("CAPTCHA_MAX_HEIGHT", base.max_height),
            poll_interval_ms: env_parse("CAPTCHA_POLL_INTERVAL_MS", base.poll_interval_ms),
            drain_interval_ms: env_parse("CAPTCHA_DRAIN_INTERVAL_MS", base.drain_interval_ms),
            enable_whitelist: env_parse("CAPTCHA_ENABLE_WHITELIST", base.enable_whitelist),
            whitelist: env_list("CAPTCHA_WHITELIST", base.whitelist),
            verbose_logging: env_parse("CAPTCHA_VERBOSE_LOGGING", base.verbose_logging),
            model_mirrors: env_list("CAPTCHA_MODEL_MIRRORS", base.model_mirrors),
            model_repo: env_string("CAPTCHA_MODEL_REPO", base.model_repo),
            model_branch: env_string("CAPTCHA_MODEL_BRANCH", base.model_branch),
            model_path: env_string("CAPTCHA_MODEL_PATH", base.model_path),
            charsets_path: env_string("CAPTCHA_CHARSETS_PATH", base.charsets_path),
            model_version: env_string("CAPTCHA_MODEL_VERSION", base.model_version),
            model_cache_dir: env_string("CAPTCHA_MODEL_CACHE_DIR", base.model_cache_dir),
            cache_duration_days: env_parse("CAPTCHA_CACHE_DURATION_DAYS", base.cache_duration_days),
            auto_download: env_parse("CAPTCHA_AUTO_DOWNLOAD", base.auto_download),
            ocr_endpoint: env_string("CAPTCHA_OCR_ENDPOINT", base.ocr_endpoint),
        }
    }

    /// 完整关键词列表：内置 + 追加，全部小写
    pub fn keyword_list(&self) -> Vec<String> {
        let mut keywords: Vec<String> = CAPTCHA_KEYWORDS.iter().map(|k| k.to_lowercase()).collect();
        for extra in &self.extra_keywords {
            let extra = extra.trim().to_lowercase();
            if !extra.is_empty() && !keywords.contains(&extra) {
                keywords.push(extra);
            }
        }
        keywords
    }

    /// 当前站点是否在白名单中（通配符匹配，大小写不敏感）
    pub fn is_host_whitelisted(&self, hostname: &str) -> bool {
        self.whitelist.iter().any(|pattern| {
            let escaped = regex::escape(pattern.trim()).replace(r"\*", ".*");
            match Regex::new(&format!("(?i)^{}$", escaped)) {
                Ok(re) => re.is_match(hostname),
                Err(_) => false,
            }
        })
    }

    /// 是否允许在当前站点运行（白名单未启用时始终允许）
    pub fn should_run(&self, hostname: &str) -> bool {
        if !self.enable_whitelist {
            return true;
        }
        if self.whitelist.is_empty() {
            return false;
        }
        self.is_host_whitelisted(hostname)
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(name) {
        Ok(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_list_contains_builtin_and_extra() {
        let mut config = Config::default();
        config.extra_keywords = vec!["MyCode".to_string(), "captcha".to_string()];

        let keywords = config.keyword_list();
        assert!(keywords.contains(&"captcha".to_string()));
        assert!(keywords.contains(&"验证码".to_string()));
        assert!(keywords.contains(&"mycode".to_string()));
        // 重复关键词不会出现两次
        assert_eq!(keywords.iter().filter(|k| k.as_str() == "captcha").count(), 1);
    }

    #[test]
    fn test_whitelist_wildcard_matching() {
        let mut config = Config::default();
        config.whitelist = vec!["*.example.com".to_string(), "login.test.cn".to_string()];

        assert!(config.is_host_whitelisted("www.example.com"));
        assert!(config.is_host_whitelisted("SSO.EXAMPLE.COM"));
        assert!(config.is_host_whitelisted("login.test.cn"));
        assert!(!config.is_host_whitelisted("example.org"));
        assert!(!config.is_host_whitelisted("test.cn"));
    }

    #[test]
    fn test_should_run_whitelist_semantics() {
        let mut config = Config::default();
        // 白名单未启用：任何站点都允许
        assert!(config.should_run("anything.com"));

        // 白名单启用但为空：一律不允许
        config.enable_whitelist = true;
        assert!(!config.should_run("anything.com"));

        config.whitelist = vec!["*.bank.com".to_string()];
        assert!(config.should_run("www.bank.com"));
        assert!(!config.should_run("www.other.com"));
    }

    #[test]
    fn test_from_toml_str() {
        let content = r##"
            browser_debug_port = 9333
            captcha_selector = "#captcha-img"
            whitelist = ["*.example.com"]
        "##;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.browser_debug_port, 9333);
        assert_eq!(config.captcha_selector, "#captcha-img");
        assert_eq!(config.whitelist, vec!["*.example.com".to_string()]);
        // 未出现的字段回落到默认值
        assert_eq!(config.poll_interval_ms, 2000);
    }
}
