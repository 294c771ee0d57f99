//! Region and self-link helpers

/// Region for a zone, region or location string
///
/// `us-central1-a` becomes `us-central1`; region and multi-region strings
/// pass through lower-cased. URLs are reduced to their last path segment
/// first, and an empty value means `global`.
pub fn region_from_location(location: &str) -> String {
    let last = last_segment(location).trim().to_ascii_lowercase();
    if last.is_empty() {
        return "global".to_string();
    }

    if let Some((region, zone)) = last.rsplit_once('-') {
        let is_zone_suffix = zone.len() == 1 && zone.chars().all(|c| c.is_ascii_lowercase());
        let region_ends_in_digit = region.chars().last().is_some_and(|c| c.is_ascii_digit());
        if is_zone_suffix && region_ends_in_digit {
            return region.to_string();
        }
    }

    last
}

/// Last `/`-separated segment of a URL or resource path
pub fn last_segment(value: &str) -> &str {
    value
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(value)
}

/// Strip scheme, host and API version from a self-link
///
/// `https://www.googleapis.com/compute/v1/projects/p/zones/z/instances/i`
/// becomes `projects/p/zones/z/instances/i`; storage links become
/// `b/<bucket>`. Values that are not URLs are returned trimmed.
pub fn normalize_self_link(link: &str) -> String {
    let link = link.trim();
    let path = match link.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => link,
    };

    if let Some(index) = find_segment(path, "projects") {
        return path[index..].trim_end_matches('/').to_string();
    }
    if let Some(index) = find_segment(path, "b") {
        return path[index..].trim_end_matches('/').to_string();
    }
    path.trim_matches('/').to_string()
}

/// Byte offset of `segment/` at the start of a path segment
fn find_segment(path: &str, segment: &str) -> Option<usize> {
    let needle = format!("{}/", segment);
    if path.starts_with(&needle) {
        return Some(0);
    }
    path.find(&format!("/{}", needle)).map(|index| index + 1)
}

/// Value following `key` in a `key/value/...` resource path
pub fn path_component<'a>(path: &'a str, key: &str) -> Option<&'a str> {
    let mut parts = path.split('/');
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next().filter(|value| !value.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_suffix_is_stripped() {
        assert_eq!(region_from_location("us-central1-a"), "us-central1");
        assert_eq!(region_from_location("europe-west4-b"), "europe-west4");
        assert_eq!(
            region_from_location(
                "https://www.googleapis.com/compute/v1/projects/p/zones/asia-east1-c"
            ),
            "asia-east1"
        );
    }

    #[test]
    fn test_regions_pass_through() {
        assert_eq!(region_from_location("us-central1"), "us-central1");
        assert_eq!(region_from_location("US"), "us");
        assert_eq!(region_from_location("EUROPE-WEST1"), "europe-west1");
        assert_eq!(region_from_location("global"), "global");
        assert_eq!(region_from_location(""), "global");
    }

    #[test]
    fn test_normalize_self_link() {
        assert_eq!(
            normalize_self_link(
                "https://www.googleapis.com/compute/v1/projects/demo/zones/us-central1-a/instances/web"
            ),
            "projects/demo/zones/us-central1-a/instances/web"
        );
        assert_eq!(
            normalize_self_link("https://www.googleapis.com/storage/v1/b/assets"),
            "b/assets"
        );
        assert_eq!(
            normalize_self_link("projects/demo/topics/events"),
            "projects/demo/topics/events"
        );
    }

    #[test]
    fn test_path_component() {
        let name = "projects/demo/locations/us-east1/services/api";
        assert_eq!(path_component(name, "locations"), Some("us-east1"));
        assert_eq!(path_component(name, "zones"), None);
        assert_eq!(last_segment(name), "api");
    }
}
