use serde::{Deserialize, Serialize};

/// Locale rules for numeric literals and function argument lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberLocale {
    pub decimal_separator: char,
    pub argument_separator: char,
    /// Grouping separator accepted (and stripped) inside numeric literals, e.g. `1.234,56` in
    /// `de-DE`. It is never emitted.
    pub thousands_separator: Option<char>,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self::en_us()
    }
}

impl NumberLocale {
    #[must_use]
    pub const fn en_us() -> Self {
        Self {
            decimal_separator: '.',
            argument_separator: ',',
            // `,` already separates arguments.
            thousands_separator: None,
        }
    }

    #[must_use]
    pub const fn de_de() -> Self {
        Self {
            decimal_separator: ',',
            argument_separator: ';',
            thousands_separator: Some('.'),
        }
    }

    /// Same punctuation as `de-DE`, but grouping uses a non-breaking space (`1 234,56`).
    #[must_use]
    pub const fn fr_fr() -> Self {
        Self {
            thousands_separator: Some('\u{00A0}'),
            ..Self::de_de()
        }
    }

    /// Resolve a BCP-47-ish locale id (`en-US`, `de_DE`, `fr`) to a preset.
    #[must_use]
    pub fn for_locale_id(id: &str) -> Option<Self> {
        let normalized = id.trim().replace('_', "-").to_ascii_lowercase();
        let lang = normalized.split('-').next()?;
        match lang {
            "en" => Some(Self::en_us()),
            "de" | "es" | "it" | "nl" => Some(Self::de_de()),
            "fr" => Some(Self::fr_fr()),
            _ => None,
        }
    }

    /// Whether `ch` may appear inside a numeric literal for this locale.
    pub(crate) fn is_number_char(&self, ch: char) -> bool {
        ch.is_ascii_digit()
            || ch == self.decimal_separator
            || ch == '.'
            || (self.thousands_separator == Some(ch) && ch != self.argument_separator)
    }

    /// Rewrites a localized literal into canonical form (`-1234.5e3`), or `None` when it is not
    /// a number.
    ///
    /// The canonical `.` is accepted as a decimal point in every locale, except where it is
    /// this locale's grouping mark and the literal is grouped by it (`1.234.567` in `de-DE`).
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let (mantissa, exponent) = split_exponent(raw.trim());
        let (sign, body) = match mantissa.chars().next() {
            Some(sign @ ('+' | '-')) => (Some(sign), &mantissa[1..]),
            _ => (None, mantissa),
        };
        let decimal = self.decimal_mark(body);

        let mut out = String::with_capacity(mantissa.len() + exponent.len());
        out.extend(sign);
        let mut seen_decimal = false;
        let mut seen_digit = false;
        for ch in body.chars() {
            match ch {
                '0'..='9' => {
                    seen_digit = true;
                    out.push(ch);
                }
                _ if Some(ch) == decimal => {
                    if seen_decimal {
                        return None;
                    }
                    seen_decimal = true;
                    out.push('.');
                }
                _ if self.is_grouping(ch) => {}
                _ => return None,
            }
        }
        if !seen_digit {
            return None;
        }
        out.push_str(exponent);
        Some(out)
    }

    fn decimal_mark(&self, body: &str) -> Option<char> {
        if body.contains(self.decimal_separator) {
            return Some(self.decimal_separator);
        }
        let grouped = self.thousands_separator == Some('.') && is_grouped(body, '.');
        (body.contains('.') && !grouped).then_some('.')
    }

    /// NBSP and narrow NBSP stand in for each other.
    fn is_grouping(&self, ch: char) -> bool {
        const SPACES: [char; 2] = ['\u{00A0}', '\u{202F}'];
        match self.thousands_separator {
            Some(sep) if SPACES.contains(&sep) => SPACES.contains(&ch),
            sep => sep == Some(ch),
        }
    }
}

/// Splits off the first `e`/`E` followed by an optionally signed run of digits.
fn split_exponent(raw: &str) -> (&str, &str) {
    for (idx, _) in raw.match_indices(|c: char| c == 'e' || c == 'E') {
        let tail = &raw[idx + 1..];
        let digits = tail
            .strip_prefix(|c: char| c == '+' || c == '-')
            .unwrap_or(tail);
        if !digits.is_empty() && is_digits(digits) {
            return raw.split_at(idx);
        }
    }
    (raw, "")
}

/// One to three leading digits, then one or more groups of exactly three.
fn is_grouped(body: &str, sep: char) -> bool {
    body.split_once(sep).is_some_and(|(lead, rest)| {
        (1..=3).contains(&lead.len())
            && is_digits(lead)
            && rest.split(sep).all(|group| group.len() == 3 && is_digits(group))
    })
}

fn is_digits(text: &str) -> bool {
    text.bytes().all(|b| b.is_ascii_digit())
}
