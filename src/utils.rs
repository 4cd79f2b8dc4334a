use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Phone-number normalization policy.  Numbers lacking a country prefix get
/// the configured default country code prepended.  This is a business rule
/// for the markets we dial into, not a universal phone algorithm; override
/// it through `DEFAULT_DIAL_PREFIX`.
#[derive(Clone, Debug)]
pub struct DialPlan {
    default_country_code: String,
}

impl DialPlan {
    /// `default_country_code` is expected in `+NN` form; a missing `+` is
    /// tolerated.
    pub fn new(default_country_code: impl Into<String>) -> Self {
        let mut code: String = default_country_code.into();
        if !code.starts_with('+') {
            code.insert(0, '+');
        }
        Self { default_country_code: code }
    }

    pub fn normalize(&self, raw: &str) -> String {
        let had_plus = raw.trim_start().starts_with('+');
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if had_plus {
            return format!("+{digits}");
        }
        if let Some(rest) = digits.strip_prefix("00") {
            return format!("+{rest}");
        }
        // Bare digits that already start with the default country code are
        // treated as international numbers missing only the plus.
        let code_digits = &self.default_country_code[1..];
        if digits.len() > 10 && digits.starts_with(code_digits) {
            return format!("+{digits}");
        }
        format!("{}{digits}", self.default_country_code)
    }
}
