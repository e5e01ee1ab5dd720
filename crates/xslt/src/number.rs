//! Formatting of `xsl:number` output: format tokens, separators and grouping.

/// How one number of a list is written.
#[derive(Debug, Clone, PartialEq)]
enum FormatToken {
    /// Decimal digits, zero-padded to the width of the token.
    Decimal(usize),
    Alphabetic { upper: bool },
    Roman { upper: bool },
}

/// A parsed `format` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFormat {
    prefix: String,
    /// Each token with the separator that precedes it (the first token's is unused).
    tokens: Vec<(String, FormatToken)>,
    suffix: String,
}

/// Grouping of decimal output, from `grouping-separator` and `grouping-size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grouping {
    pub separator: char,
    pub size: usize,
}

impl NumberFormat {
    pub fn parse(format: &str) -> Self {
        let mut prefix = String::new();
        let mut tokens = Vec::new();
        let mut pending_separator = String::new();
        let mut chars = format.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if !c.is_alphanumeric() {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                let separator = std::mem::take(&mut pending_separator);
                if tokens.is_empty() {
                    prefix = separator;
                    tokens.push((String::new(), classify(&token)));
                } else {
                    tokens.push((separator, classify(&token)));
                }
            } else {
                pending_separator.push(c);
                chars.next();
            }
        }

        if tokens.is_empty() {
            return Self {
                prefix: pending_separator,
                tokens: vec![(String::new(), FormatToken::Decimal(1))],
                suffix: String::new(),
            };
        }
        Self {
            prefix,
            tokens,
            suffix: pending_separator,
        }
    }

    /// Formats a list of numbers. Numbers past the last token reuse it, with the last
    /// separator (or `.` when the format has a single token).
    pub fn format(&self, numbers: &[u64], grouping: Option<Grouping>) -> String {
        let mut out = self.prefix.clone();
        for (i, &n) in numbers.iter().enumerate() {
            let (separator, token) = match self.tokens.get(i) {
                Some(entry) => (entry.0.as_str(), &entry.1),
                None => {
                    let separator = match self.tokens.len() {
                        1 => ".",
                        len => self.tokens[len - 1].0.as_str(),
                    };
                    (separator, &self.tokens[self.tokens.len() - 1].1)
                }
            };
            if i > 0 {
                out.push_str(separator);
            }
            out.push_str(&format_one(n, token, grouping));
        }
        if !numbers.is_empty() {
            out.push_str(&self.suffix);
        }
        out
    }
}

fn classify(token: &str) -> FormatToken {
    match token {
        "a" => FormatToken::Alphabetic { upper: false },
        "A" => FormatToken::Alphabetic { upper: true },
        "i" => FormatToken::Roman { upper: false },
        "I" => FormatToken::Roman { upper: true },
        t if t.ends_with('1') && t[..t.len() - 1].chars().all(|c| c == '0') => {
            FormatToken::Decimal(t.len())
        }
        _ => FormatToken::Decimal(1),
    }
}

fn format_one(n: u64, token: &FormatToken, grouping: Option<Grouping>) -> String {
    match token {
        FormatToken::Alphabetic { upper } if n > 0 => alphabetic(n, *upper),
        FormatToken::Roman { upper } if n > 0 && n < 4000 => roman(n, *upper),
        FormatToken::Decimal(width) => decimal(n, *width, grouping),
        _ => decimal(n, 1, grouping),
    }
}

fn decimal(n: u64, width: usize, grouping: Option<Grouping>) -> String {
    let digits = format!("{:0width$}", n, width = width);
    let Some(Grouping { separator, size }) = grouping.filter(|g| g.size > 0) else {
        return digits;
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / size);
    let len = digits.len();
    for (i, d) in digits.chars().enumerate() {
        if i > 0 && (len - i) % size == 0 {
            out.push(separator);
        }
        out.push(d);
    }
    out
}

/// `a`..`z`, then `aa`, `ab`, ...
fn alphabetic(mut n: u64, upper: bool) -> String {
    let base = if upper { b'A' } else { b'a' };
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((base + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(mut n: u64, upper: bool) -> String {
    const NUMERALS: &[(u64, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for &(value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    if upper { out.to_uppercase() } else { out }
}
