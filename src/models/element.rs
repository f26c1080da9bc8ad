//! 候选元素模型
//!
//! 页面元素归属于页面本身，本系统只通过 token 引用并读取，
//! 四种元素类型以封闭枚举建模，各自只携带自己需要的信息。

use serde::Deserialize;
use std::fmt;

/// 候选元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ElementKind {
    /// <img> 元素
    #[serde(rename = "img")]
    Image,
    /// <canvas> 元素
    #[serde(rename = "canvas")]
    Canvas,
    /// <svg> 矢量图
    #[serde(rename = "svg")]
    Svg,
    /// 带背景图的 <div> 等普通元素
    #[serde(rename = "div")]
    BackgroundDiv,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Image => "img",
            ElementKind::Canvas => "canvas",
            ElementKind::Svg => "svg",
            ElementKind::BackgroundDiv => "div",
        };
        write!(f, "{}", name)
    }
}

/// 页面元素描述
///
/// 由页面内脚本（page agent）生成，携带分类所需的全部信息：
/// - `ident` 是元素标识属性的拼接（按类型取 src/class/id/alt/data-* 等）
/// - `bg` 只有背景图元素才会携带
/// - `matches_selector` 只有配置了验证码选择器时才会出现
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// 元素 token（页面内脚本分配，元素存活期间不变）
    pub token: String,
    pub kind: ElementKind,
    pub width: u32,
    pub height: u32,
    /// 标识属性拼接，用于关键词匹配
    #[serde(default)]
    pub ident: String,
    /// 图片元素的来源 URL（src 或 data-src）
    #[serde(default)]
    pub src: Option<String>,
    /// 行内背景图样式值
    #[serde(default)]
    pub bg: Option<String>,
    /// 配置了验证码选择器时的匹配结果
    #[serde(default)]
    pub matches_selector: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"{
            "token": "e3",
            "kind": "img",
            "width": 120,
            "height": 40,
            "ident": "https://x/captcha.png captcha-img",
            "src": "https://x/captcha.png",
            "bg": null,
            "matchesSelector": null
        }"#;
        let d: ElementDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.token, "e3");
        assert_eq!(d.kind, ElementKind::Image);
        assert_eq!(d.width, 120);
        assert!(d.matches_selector.is_none());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ElementKind::Image.to_string(), "img");
        assert_eq!(ElementKind::BackgroundDiv.to_string(), "div");
    }
}
