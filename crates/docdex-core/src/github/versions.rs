//! Version planning over repository tags
//!
//! Tags are parsed as semver-ish (`v16.2.0`, `2.1.3-rc.1`); labels
//! group them into `N.x` series. The ingest plan unions previously
//! synced labels, the source's declared label, and the newest few
//! major series.

/// A parsed semver-like tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverTag {
    pub raw: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemverTag {
    fn ord_key(&self) -> (u64, u64, u64, bool) {
        // Stable releases sort above their own prereleases
        (self.major, self.minor, self.patch, self.prerelease.is_none())
    }

    pub fn is_stable(&self) -> bool {
        self.prerelease.is_none()
    }
}

/// Parse a tag like `v16.2.0` or `1.2` into its components
pub fn parse_semver_tag(tag: &str) -> Option<SemverTag> {
    let stripped = tag.trim().trim_start_matches('v').trim_start_matches('V');
    let (version, prerelease) = match stripped.split_once(['-', '+']) {
        Some((v, pre)) => (v, Some(pre.to_string())),
        None => (stripped, None),
    };

    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(SemverTag {
        raw: tag.trim().to_string(),
        major,
        minor,
        patch,
        prerelease,
    })
}

/// Parse a series label such as `16.x` into its major number.
/// Branch-like labels (`main`) yield `None`.
pub fn parse_series_label(label: &str) -> Option<u64> {
    let (major, rest) = label.split_once('.')?;
    if rest != "x" && rest != "X" {
        return None;
    }
    major.parse().ok()
}

/// Series label for a tag: `v16.2.3` → `16.x`
pub fn extract_major_version(tag: &str) -> Option<String> {
    parse_semver_tag(tag).map(|t| format!("{}.x", t.major))
}

/// Highest stable tag overall, falling back to the highest prerelease
pub fn pick_default_version(tags: &[String]) -> Option<String> {
    let parsed: Vec<SemverTag> = tags.iter().filter_map(|t| parse_semver_tag(t)).collect();
    parsed
        .iter()
        .filter(|t| t.is_stable())
        .max_by_key(|t| t.ord_key())
        .or_else(|| parsed.iter().max_by_key(|t| t.ord_key()))
        .map(|t| t.raw.clone())
}

/// Highest stable tag within a `N.x` series
pub fn pick_latest_for_series(tags: &[String], series_label: &str) -> Option<String> {
    let major = parse_series_label(series_label)?;
    tags.iter()
        .filter_map(|t| parse_semver_tag(t))
        .filter(|t| t.major == major && t.is_stable())
        .max_by_key(|t| t.ord_key())
        .map(|t| t.raw)
}

/// Newest stable tag of each major series, newest series first
pub fn latest_tag_by_major(tags: &[String]) -> Vec<(String, String)> {
    let mut best: std::collections::BTreeMap<u64, SemverTag> = std::collections::BTreeMap::new();
    for tag in tags.iter().filter_map(|t| parse_semver_tag(t)) {
        if !tag.is_stable() {
            continue;
        }
        match best.get(&tag.major) {
            Some(existing) if existing.ord_key() >= tag.ord_key() => {}
            _ => {
                best.insert(tag.major, tag);
            }
        }
    }
    best.into_iter()
        .rev()
        .map(|(major, tag)| (format!("{}.x", major), tag.raw))
        .collect()
}

/// One planned sync unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub label: String,
    /// Ref to fetch; `None` means the repo default branch
    pub git_ref: Option<String>,
}

/// Build the ordered label plan for a source.
///
/// Prior labels come first so incremental syncs refresh what exists,
/// then the declared label, then the newest `max_majors` series from
/// tags. Each label resolves to the latest stable tag of its series
/// when one exists, else the declared ref, else the default branch.
pub fn build_version_plan(
    prior_labels: &[String],
    declared_label: Option<&str>,
    declared_ref: Option<&str>,
    tags: &[String],
    max_majors: usize,
) -> Vec<PlanEntry> {
    let mut labels: Vec<String> = Vec::new();
    let mut push = |label: &str, labels: &mut Vec<String>| {
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    };

    for label in prior_labels {
        push(label, &mut labels);
    }
    if let Some(label) = declared_label {
        push(label, &mut labels);
    }
    for (label, _) in latest_tag_by_major(tags).into_iter().take(max_majors) {
        push(&label, &mut labels);
    }
    if labels.is_empty() {
        push(declared_ref.unwrap_or("main"), &mut labels);
    }

    labels
        .into_iter()
        .map(|label| {
            let git_ref = pick_latest_for_series(tags, &label)
                .or_else(|| declared_ref.map(|r| r.to_string()));
            PlanEntry { label, git_ref }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_semver_tag() {
        let tag = parse_semver_tag("v16.2.0").unwrap();
        assert_eq!((tag.major, tag.minor, tag.patch), (16, 2, 0));
        assert!(tag.is_stable());

        let pre = parse_semver_tag("2.0.0-rc.1").unwrap();
        assert_eq!(pre.prerelease.as_deref(), Some("rc.1"));

        assert!(parse_semver_tag("main").is_none());
        assert!(parse_semver_tag("v1.2.3.4").is_none());
    }

    #[test]
    fn test_parse_series_label() {
        assert_eq!(parse_series_label("16.x"), Some(16));
        assert_eq!(parse_series_label("main"), None);
        assert_eq!(parse_series_label("16.2"), None);
    }

    #[test]
    fn test_pick_latest_for_series() {
        let tags = tags(&["v16.2.0", "v16.1.0", "v15.9.9"]);
        assert_eq!(
            pick_latest_for_series(&tags, "16.x").as_deref(),
            Some("v16.2.0")
        );
        assert_eq!(
            pick_latest_for_series(&tags, "15.x").as_deref(),
            Some("v15.9.9")
        );
        assert!(pick_latest_for_series(&tags, "14.x").is_none());
        assert!(pick_latest_for_series(&tags, "main").is_none());
    }

    #[test]
    fn test_extract_major_version() {
        assert_eq!(extract_major_version("v16.2.3").as_deref(), Some("16.x"));
        assert!(extract_major_version("trunk").is_none());
    }

    #[test]
    fn test_pick_default_prefers_stable() {
        let tags = tags(&["v2.0.0-beta.1", "v1.9.0", "v1.8.0"]);
        assert_eq!(pick_default_version(&tags).as_deref(), Some("v1.9.0"));

        let only_pre = vec!["v2.0.0-beta.1".to_string()];
        assert_eq!(
            pick_default_version(&only_pre).as_deref(),
            Some("v2.0.0-beta.1")
        );
    }

    #[test]
    fn test_latest_tag_by_major_ordering() {
        let tags = tags(&["v14.0.1", "v16.2.0", "v15.3.0", "v16.1.0", "v16.3.0-rc.1"]);
        let by_major = latest_tag_by_major(&tags);
        assert_eq!(
            by_major,
            vec![
                ("16.x".to_string(), "v16.2.0".to_string()),
                ("15.x".to_string(), "v15.3.0".to_string()),
                ("14.x".to_string(), "v14.0.1".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_version_plan() {
        let tags = tags(&["v16.2.0", "v16.1.0", "v15.9.9", "v3.0.0"]);
        let plan = build_version_plan(
            &["15.x".to_string()],
            Some("16.x"),
            None,
            &tags,
            2,
        );

        let labels: Vec<&str> = plan.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["15.x", "16.x"]);
        assert_eq!(plan[0].git_ref.as_deref(), Some("v15.9.9"));
        assert_eq!(plan[1].git_ref.as_deref(), Some("v16.2.0"));
    }

    #[test]
    fn test_build_version_plan_no_tags() {
        let plan = build_version_plan(&[], None, Some("main"), &[], 3);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].label, "main");
        assert_eq!(plan[0].git_ref.as_deref(), Some("main"));
    }
}
