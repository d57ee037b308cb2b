use woothee::parser::Parser;

const UNKNOWN: &str = "UNKNOWN";

/// Browser, OS and device as far as the user agent reveals them. Unknown
/// values are left as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
}

fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == UNKNOWN {
        None
    } else {
        Some(value.to_owned())
    }
}

fn device_brand(os: &str, vendor: &str) -> Option<String> {
    match os {
        "iPhone" | "iPad" | "iPod" | "Mac OSX" | "iOS" => Some("Apple".to_owned()),
        _ => known(vendor),
    }
}

pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    if user_agent.trim().is_empty() {
        return UserAgentInfo::default();
    }
    let Some(result) = Parser::new().parse(user_agent) else {
        return UserAgentInfo::default();
    };

    let device_type = match result.category {
        "smartphone" | "mobilephone" => Some("mobile"),
        "tablet" => Some("tablet"),
        "pc" => Some("desktop"),
        "crawler" => Some("bot"),
        _ => None,
    };
    // woothee reports iPads and iPhones as the OS name
    let device_model = match result.os {
        "iPhone" | "iPad" | "iPod" => Some(result.os.to_owned()),
        _ => None,
    };

    UserAgentInfo {
        browser_name: known(result.name),
        browser_version: known(result.version),
        os_name: known(result.os),
        os_version: known(&result.os_version),
        device_type: device_type.map(str::to_owned),
        device_brand: device_brand(result.os, result.vendor),
        device_model,
    }
}

/// The crawler name when the parser recognises the agent as one.
pub fn crawler_name(user_agent: &str) -> Option<String> {
    let result = Parser::new().parse(user_agent)?;
    (result.category == "crawler").then(|| result.name.to_owned())
}
