use tracing::warn;

use crate::error::PipelineError;
use crate::upstream::UpstreamApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconCheck {
    pub url: String,
    pub fallback: Option<PipelineError>,
}

impl IconCheck {
    pub fn used_placeholder(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Probe an icon URL and fall back to the local placeholder when it cannot be
/// reached. Always yields a usable, non-empty URL.
pub fn validate_icon<A: UpstreamApi + ?Sized>(
    api: &A,
    app_id: &str,
    icon_url: &str,
    placeholder: &str,
) -> IconCheck {
    let reachable = if icon_url.trim().is_empty() {
        Err(anyhow::anyhow!("no icon URL"))
    } else {
        api.head(icon_url)
    };
    match reachable {
        Ok(()) => IconCheck {
            url: icon_url.to_string(),
            fallback: None,
        },
        Err(error) => {
            let unavailable = PipelineError::AssetUnavailable {
                app_id: app_id.to_string(),
                url: icon_url.to_string(),
                detail: format!("{error:#}"),
            };
            warn!("{unavailable}; using {placeholder}");
            IconCheck {
                url: placeholder.to_string(),
                fallback: Some(unavailable),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::validate_icon;
    use crate::upstream::RepoCoordinate;
    use crate::upstream::testing::MockUpstream;

    const PLACEHOLDER: &str = "assets/images/placeholder-app.png";

    #[test]
    fn reachable_icon_is_kept() {
        let repo = RepoCoordinate::default();
        let api = MockUpstream::default().icon(&repo, "alpha");
        let check = validate_icon(&api, "alpha", &repo.icon_url("alpha"), PLACEHOLDER);
        assert_eq!(check.url, repo.icon_url("alpha"));
        assert!(!check.used_placeholder());
    }

    #[test]
    fn missing_icon_falls_back_to_placeholder() {
        let repo = RepoCoordinate::default();
        let api = MockUpstream::default();
        let check = validate_icon(&api, "alpha", &repo.icon_url("alpha"), PLACEHOLDER);
        assert_eq!(check.url, PLACEHOLDER);
        assert!(check.used_placeholder());
    }

    #[test]
    fn empty_icon_url_is_never_requested() {
        let api = MockUpstream::default();
        let check = validate_icon(&api, "alpha", "  ", PLACEHOLDER);
        assert_eq!(check.url, PLACEHOLDER);
        assert_eq!(api.request_count.into_inner(), 0);
    }
}
