//! Utility functions for value normalization

/// Normalize region value (e.g., "apsarastack.Region.cn_qingdao_env17_d01" -> "cn-qingdao-env17-d01")
pub fn normalize_region(s: &str) -> String {
    let region_part = if s.contains('.') {
        s.split('.').next_back().unwrap_or(s)
    } else {
        s
    };
    region_part.replace('_', "-")
}

/// Drop empty strings the control plane returns for unset attributes
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("cn_qingdao_env17_d01"), "cn-qingdao-env17-d01");
        assert_eq!(
            normalize_region("apsarastack.Region.cn_hangzhou"),
            "cn-hangzhou"
        );
        assert_eq!(normalize_region("cn-beijing"), "cn-beijing");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("a".to_string())), Some("a".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
