use serde::Deserialize;

/// Body of `POST /cast`. Every field is optional; the address defaults to the
/// peer address of the request.
#[derive(Debug, Default, Deserialize)]
pub struct CastRequest {
    pub host_ip: Option<String>,
    pub pc_name: Option<String>,
    /// Alias of `pc_name`
    pub host_name: Option<String>,
}

impl CastRequest {
    /// First non-blank of `pc_name` and `host_name`, trimmed
    pub fn requested_name(&self) -> Option<&str> {
        non_blank(&self.pc_name).or_else(|| non_blank(&self.host_name))
    }
}

fn non_blank(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_pc_name_falls_through_to_host_name() {
        let request = CastRequest {
            pc_name: Some("  ".to_string()),
            host_name: Some(" STUDY-PC ".to_string()),
            ..CastRequest::default()
        };
        assert_eq!(request.requested_name(), Some("STUDY-PC"));

        let both = CastRequest {
            pc_name: Some("DESKTOP-1".to_string()),
            host_name: Some("STUDY-PC".to_string()),
            ..CastRequest::default()
        };
        assert_eq!(both.requested_name(), Some("DESKTOP-1"));
        assert_eq!(CastRequest::default().requested_name(), None);
    }
}
