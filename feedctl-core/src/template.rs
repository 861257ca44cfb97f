use std::collections::HashMap;

/// `%x`-style template: every registered `%<char>` is replaced by its value,
/// `%%` yields a literal percent sign, unknown sequences are kept as written.
#[derive(Debug, Default, Clone)]
pub struct Template {
    vars: HashMap<char, String>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, key: char, value: impl ToString) -> Self {
        self.vars.insert(key, value.to_string());
        self
    }

    pub fn render(&self, format: &str) -> String {
        let mut out = String::with_capacity(format.len());
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(key) => match self.vars.get(&key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('%');
                        out.push(key);
                    }
                },
                None => out.push('%'),
            }
        }
        out
    }
}
