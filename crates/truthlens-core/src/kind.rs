use serde::{Deserialize, Serialize};

/// The three kinds of content that can be submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Text,
    Link,
    Image,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Text => "text",
            AnalysisKind::Link => "link",
            AnalysisKind::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(AnalysisKind::Text),
            "link" | "url" => Some(AnalysisKind::Link),
            "image" => Some(AnalysisKind::Image),
            _ => None,
        }
    }

    pub fn all() -> Vec<AnalysisKind> {
        vec![AnalysisKind::Text, AnalysisKind::Link, AnalysisKind::Image]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AnalysisKind::Text => "Text",
            AnalysisKind::Link => "Link",
            AnalysisKind::Image => "Image",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_as_str() {
        for kind in AnalysisKind::all() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(AnalysisKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn from_str_accepts_url_alias() {
        assert_eq!(AnalysisKind::from_str("URL"), Some(AnalysisKind::Link));
        assert_eq!(AnalysisKind::from_str("video"), None);
    }
}
