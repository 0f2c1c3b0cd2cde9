/// Recognised inbound topics, after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    OrdersPaid,
    MilestonePaid,
    AppUninstalled,
    Other(String),
}

impl Topic {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize_topic(raw);
        match normalized.as_str() {
            "orders_paid" => Self::OrdersPaid,
            "milestone_paid" => Self::MilestonePaid,
            "app_uninstalled" => Self::AppUninstalled,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::OrdersPaid => "orders_paid",
            Self::MilestonePaid => "milestone_paid",
            Self::AppUninstalled => "app_uninstalled",
            Self::Other(s) => s,
        }
    }
}

/// `"Orders/Paid"` -> `"orders_paid"`: lower-case, `/ . -` become `_`,
/// runs of `_` collapse, and edge underscores are trimmed.
pub fn normalize_topic(topic: &str) -> String {
    let mut out = String::with_capacity(topic.len());
    for c in topic.trim().chars().flat_map(char::to_lowercase) {
        let c = match c {
            '/' | '.' | '-' => '_',
            other => other,
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}
