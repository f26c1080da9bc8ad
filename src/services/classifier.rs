//! 候选元素分类 - 业务能力层
//!
//! 只负责"这个元素像不像验证码"的判断，不关心流程

use tracing::debug;

use crate::config::Config;
use crate::models::element::{ElementDescriptor, ElementKind};

/// 候选元素分类器
///
/// 配置了验证码选择器时只看选择器匹配结果，启发式完全跳过；
/// 否则按尺寸范围 + 标识属性关键词判断。
#[derive(Clone)]
pub struct ElementClassifier {
    selector_configured: bool,
    keywords: Vec<String>,
    min_width: u32,
    min_height: u32,
    max_width: u32,
    max_height: u32,
}

impl ElementClassifier {
    pub fn new(config: &Config) -> Self {
        Self {
            selector_configured: !config.captcha_selector.trim().is_empty(),
            keywords: config.keyword_list(),
            min_width: config.min_width,
            min_height: config.min_height,
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    /// 判断元素是否是验证码候选
    pub fn accepts(&self, descriptor: &ElementDescriptor) -> bool {
        if self.selector_configured {
            // 显式选择器是唯一标准
            return descriptor.matches_selector == Some(true);
        }

        if descriptor.width < self.min_width || descriptor.height < self.min_height {
            return false;
        }
        if descriptor.width > self.max_width || descriptor.height > self.max_height {
            return false;
        }

        // 背景图元素必须真的有背景图
        if descriptor.kind == ElementKind::BackgroundDiv
            && descriptor.bg.as_deref().unwrap_or("").is_empty()
        {
            return false;
        }

        let ident = descriptor.ident.to_lowercase();
        let hit = self.keywords.iter().any(|k| ident.contains(k.as_str()));
        if !hit {
            debug!(
                "元素 {} ({}) 未命中关键词，忽略",
                descriptor.token, descriptor.kind
            );
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: ElementKind, width: u32, height: u32, ident: &str) -> ElementDescriptor {
        ElementDescriptor {
            token: "e1".to_string(),
            kind,
            width,
            height,
            ident: ident.to_string(),
            src: None,
            bg: None,
            matches_selector: None,
        }
    }

    fn heuristic_classifier() -> ElementClassifier {
        ElementClassifier::new(&Config::default())
    }

    #[test]
    fn test_accepts_keyword_image_in_bounds() {
        // 120x40、class 含 captcha 的图片应当通过
        let d = descriptor(
            ElementKind::Image,
            120,
            40,
            "https://x/captcha.png captcha-img",
        );
        assert!(heuristic_classifier().accepts(&d));
    }

    #[test]
    fn test_rejects_too_small_canvas_despite_keyword() {
        // 30x15 低于 40x20 下限，即使命中 vcode 也拒绝
        let d = descriptor(ElementKind::Canvas, 30, 15, "vcode");
        assert!(!heuristic_classifier().accepts(&d));
    }

    #[test]
    fn test_rejects_without_keyword() {
        let d = descriptor(ElementKind::Image, 120, 40, "https://x/logo.png brand-logo");
        assert!(!heuristic_classifier().accepts(&d));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let c = heuristic_classifier();
        assert!(c.accepts(&descriptor(ElementKind::Image, 40, 20, "captcha")));
        assert!(c.accepts(&descriptor(ElementKind::Image, 500, 200, "captcha")));
        assert!(!c.accepts(&descriptor(ElementKind::Image, 501, 100, "captcha")));
        assert!(!c.accepts(&descriptor(ElementKind::Image, 100, 201, "captcha")));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let d = descriptor(ElementKind::Image, 120, 40, "SignCaptcha-IMG");
        assert!(heuristic_classifier().accepts(&d));
    }

    #[test]
    fn test_background_div_requires_background_value() {
        let c = heuristic_classifier();
        let mut d = descriptor(ElementKind::BackgroundDiv, 120, 40, "captcha-bg");
        assert!(!c.accepts(&d));

        d.bg = Some("url(\"https://x/captcha.png\")".to_string());
        assert!(c.accepts(&d));
    }

    #[test]
    fn test_selector_overrides_heuristic() {
        let mut config = Config::default();
        config.captcha_selector = "#captcha".to_string();
        let c = ElementClassifier::new(&config);

        // 启发式会接受的元素：选择器不匹配时仍然拒绝
        let mut d = descriptor(ElementKind::Image, 120, 40, "captcha-img");
        d.matches_selector = Some(false);
        assert!(!c.accepts(&d));

        // 启发式会拒绝的元素：选择器匹配时仍然接受
        let mut d = descriptor(ElementKind::Image, 10, 10, "tiny-logo");
        d.matches_selector = Some(true);
        assert!(c.accepts(&d));
    }

    #[test]
    fn test_extra_keywords_extend_builtin() {
        let mut config = Config::default();
        config.extra_keywords = vec!["pincode".to_string()];
        let c = ElementClassifier::new(&config);

        let d = descriptor(ElementKind::Image, 120, 40, "login-pincode-img");
        assert!(c.accepts(&d));
    }
}
