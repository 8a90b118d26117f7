use crate::UrlError;
use url::Url;

/// Canonicalizes a result or permalink URL so its identity is stable
///
/// # Canonicalization Steps
///
/// 1. Resolve `href` against `base` when it is relative
/// 2. Reject anything that is not HTTP(S) or has no host
/// 3. Lowercase the host (done by the parser)
/// 4. Remove the query string (search-session and tracking parameters)
/// 5. Remove the fragment
///
/// # Arguments
///
/// * `href` - The raw link as found on the page
/// * `base` - The URL of the page the link was found on
///
/// # Examples
///
/// ```
/// use hotel_harvest::url::canonical_url;
/// use url::Url;
///
/// let base = Url::parse("https://www.example.com/Hotels-oa30.html").unwrap();
/// let url = canonical_url("/Hotel_Review-d1.html?spAttributionToken=abc#REVIEWS", &base).unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/Hotel_Review-d1.html");
/// ```
pub fn canonical_url(href: &str, base: &Url) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Parse("empty link".to_string()));
    }

    let mut url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Resolves a link against a page URL without dropping its query
///
/// Used for pagination links, where the query may carry the page offset.
pub fn resolve_link(href: &str, base: &Url) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return Err(UrlError::Parse(format!("not a navigable link: '{}'", href)));
    }

    let mut url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    url.set_fragment(None);
    Ok(url)
}
