use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 浏览器相关错误
    Browser(BrowserError),
    /// 图像处理错误
    Image(ImageError),
    /// 识别相关错误
    Recognition(RecognitionError),
    /// 输入框相关错误
    Input(InputError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Image(e) => write!(f, "图像错误: {}", e),
            AppError::Recognition(e) => write!(f, "识别错误: {}", e),
            AppError::Input(e) => write!(f, "输入框错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Browser(e) => Some(e),
            AppError::Image(e) => Some(e),
            AppError::Recognition(e) => Some(e),
            AppError::Input(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 浏览器相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 连接浏览器失败
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 查找目标页面失败
    PageLookupFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面脚本注入失败
    AgentInjectionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::ConnectionFailed { port, source } => {
                write!(f, "无法连接到浏览器 (端口: {}): {}", port, source)
            }
            BrowserError::PageLookupFailed { source } => {
                write!(f, "查找目标页面失败: {}", source)
            }
            BrowserError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
            BrowserError::AgentInjectionFailed { source } => {
                write!(f, "页面脚本注入失败: {}", source)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::ConnectionFailed { source, .. }
            | BrowserError::PageLookupFailed { source }
            | BrowserError::ScriptExecutionFailed { source }
            | BrowserError::AgentInjectionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 图像处理错误
#[derive(Debug)]
pub enum ImageError {
    /// 图像解码失败
    DecodeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 图像下载失败
    FetchFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 图像尺寸异常
    EmptyImage { width: u32, height: u32 },
    /// 元素快照不可用（元素已消失或 canvas 被污染）
    SnapshotUnavailable { token: String },
    /// 背景图样式中没有可用的 URL
    BackgroundUrlMissing { value: String },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::DecodeFailed { source } => {
                write!(f, "图像解码失败: {}", source)
            }
            ImageError::FetchFailed { url, source } => {
                write!(f, "图像下载失败 ({}): {}", url, source)
            }
            ImageError::EmptyImage { width, height } => {
                write!(f, "图像尺寸异常: {}x{}", width, height)
            }
            ImageError::SnapshotUnavailable { token } => {
                write!(f, "元素快照不可用: {}", token)
            }
            ImageError::BackgroundUrlMissing { value } => {
                write!(f, "背景图样式中没有可用的 URL: {}", value)
            }
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageError::DecodeFailed { source } | ImageError::FetchFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 识别相关错误
#[derive(Debug)]
pub enum RecognitionError {
    /// 推理运行时不可用
    RuntimeUnavailable { endpoint: String },
    /// 推理调用失败
    InferenceFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 字符集为空
    CharsetEmpty,
    /// 模型下载失败（所有镜像均失败）
    ModelDownloadFailed { mirrors: usize },
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::RuntimeUnavailable { endpoint } => {
                write!(f, "推理运行时不可用: {}", endpoint)
            }
            RecognitionError::InferenceFailed { source } => {
                write!(f, "推理调用失败: {}", source)
            }
            RecognitionError::CharsetEmpty => write!(f, "字符集为空"),
            RecognitionError::ModelDownloadFailed { mirrors } => {
                write!(f, "模型下载失败: {} 个镜像均不可用", mirrors)
            }
        }
    }
}

impl std::error::Error for RecognitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecognitionError::InferenceFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 输入框相关错误
#[derive(Debug)]
pub enum InputError {
    /// 未找到关联输入框
    NotFound { token: String },
    /// 填充失败
    FillFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::NotFound { token } => {
                write!(f, "未找到候选元素 {} 的关联输入框", token)
            }
            InputError::FillFailed { source } => write!(f, "填充输入框失败: {}", source),
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::FillFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========
// anyhow 已经为所有实现了 std::error::Error 的类型提供了自动转换，
// 这里只补充本应用需要归类的第三方错误

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(ImageError::DecodeFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Recognition(RecognitionError::InferenceFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::FileParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建元素快照不可用错误
    pub fn snapshot_unavailable(token: impl Into<String>) -> Self {
        AppError::Image(ImageError::SnapshotUnavailable {
            token: token.into(),
        })
    }

    /// 创建图像下载错误
    pub fn image_fetch_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Image(ImageError::FetchFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建背景图 URL 缺失错误
    pub fn background_url_missing(value: impl Into<String>) -> Self {
        AppError::Image(ImageError::BackgroundUrlMissing {
            value: value.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
