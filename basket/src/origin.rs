use url::Url;

/// Reduces an origin or a registered domain to a bare lowercase host:
/// no scheme, no leading `www.`, no port, no path.
fn normalize_host(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let host = match Url::parse(value) {
        Ok(url) if url.host_str().is_some() => url.host_str().map(str::to_owned),
        // bare domains like `example.com:8080/path` do not parse as urls
        _ => Url::parse(&format!("https://{value}"))
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned)),
    }?;

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    (!host.is_empty()).then(|| host.to_owned())
}

/// Whether a browser origin belongs to the registered domain, either as
/// the domain itself or one of its subdomains.
pub fn is_valid_origin(origin: &str, domain: &str) -> bool {
    let (Some(origin), Some(domain)) = (normalize_host(origin), normalize_host(domain)) else {
        return false;
    };

    origin == domain || origin.ends_with(&format!(".{domain}"))
}
