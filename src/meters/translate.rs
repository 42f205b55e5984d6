//! # Bit and Index Lookups
//!
//! Drivers translate raw status registers into readable tokens with
//! declarative lookups. A `BitToString` rule names each bit inside a mask
//! and joins the set ones with spaces; set bits the rule does not name come
//! out as `UNKNOWN_XX` so nothing is silently dropped. An `IndexToString`
//! rule treats the masked value as a single index.

/// Translation strategy of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapType {
    BitToString,
    IndexToString,
}

/// One translation rule over a masked part of the value.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub map_type: MapType,
    /// Only bits inside the mask participate.
    pub mask: u64,
    /// Rendered when the masked value is zero (BitToString only).
    pub default_message: &'static str,
    pub map: Vec<(u64, &'static str)>,
}

impl Rule {
    pub fn new(name: &'static str, map_type: MapType, mask: u64) -> Rule {
        Rule {
            name,
            map_type,
            mask,
            default_message: "",
            map: Vec::new(),
        }
    }

    pub fn default_message(mut self, msg: &'static str) -> Rule {
        self.default_message = msg;
        self
    }

    pub fn add(mut self, value: u64, text: &'static str) -> Rule {
        self.map.push((value, text));
        self
    }
}

/// A set of rules applied to one extracted value.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub rules: Vec<Rule>,
}

impl Lookup {
    pub fn new() -> Lookup {
        Lookup { rules: Vec::new() }
    }

    pub fn add(mut self, rule: Rule) -> Lookup {
        self.rules.push(rule);
        self
    }

    /// Translate `value` through every rule, joining the results with
    /// spaces.
    pub fn translate(&self, value: u64) -> String {
        let mut parts: Vec<String> = Vec::new();
        for rule in &self.rules {
            let s = rule.translate(value);
            if !s.is_empty() {
                parts.push(s);
            }
        }
        parts.join(" ")
    }
}

impl Rule {
    fn translate(&self, value: u64) -> String {
        let considered = value & self.mask;
        match self.map_type {
            MapType::BitToString => {
                if considered == 0 {
                    return self.default_message.to_string();
                }
                let mut tokens: Vec<String> = Vec::new();
                let mut covered = 0u64;
                for (bit, text) in &self.map {
                    covered |= bit;
                    if considered & bit != 0 && !text.is_empty() {
                        tokens.push((*text).to_string());
                    }
                }
                let unknown = considered & !covered;
                if unknown != 0 {
                    tokens.push(format!("UNKNOWN_{unknown:X}"));
                }
                tokens.join(" ")
            }
            MapType::IndexToString => {
                for (index, text) in &self.map {
                    if *index == considered {
                        return (*text).to_string();
                    }
                }
                format!("UNKNOWN_{considered:X}")
            }
        }
    }
}

/// Tokens contributed to the combined `status` field by the TPL status
/// byte. The low two bits are a state indicator; bits 5-7 are manufacturer
/// specific and surface as `UNKNOWN_XX`.
pub fn tpl_status_tokens(sts: u8) -> Vec<String> {
    let mut tokens = Vec::new();
    match sts & 0x03 {
        0x01 => tokens.push("BUSY".to_string()),
        0x02 => tokens.push("ERROR".to_string()),
        0x03 => tokens.push("ALARM".to_string()),
        _ => {}
    }
    if sts & 0x04 != 0 {
        tokens.push("POWER_LOW".to_string());
    }
    if sts & 0x08 != 0 {
        tokens.push("PERMANENT_ERROR".to_string());
    }
    if sts & 0x10 != 0 {
        tokens.push("TEMPORARY_ERROR".to_string());
    }
    if sts & 0xE0 != 0 {
        tokens.push(format!("UNKNOWN_{:X}", sts & 0xE0));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_flags() -> Lookup {
        Lookup::new().add(
            Rule::new("ERROR_FLAGS", MapType::BitToString, 0x000F)
                .default_message("OK")
                .add(0x01, "DRY")
                .add(0x02, "REVERSE")
                .add(0x04, "LEAK")
                .add(0x08, "BURST"),
        )
    }

    #[test]
    fn test_bit_to_string() {
        let l = error_flags();
        assert_eq!(l.translate(0x0071), "DRY");
        assert_eq!(l.translate(0x0003), "DRY REVERSE");
        assert_eq!(l.translate(0x0000), "OK");
        // Bits outside the mask are ignored.
        assert_eq!(l.translate(0xFF00), "OK");
    }

    #[test]
    fn test_unknown_bits_surface() {
        let l = Lookup::new().add(
            Rule::new("ERROR_FLAGS", MapType::BitToString, 0xFF).add(0x01, "A"),
        );
        assert_eq!(l.translate(0x81), "A UNKNOWN_80");
    }

    #[test]
    fn test_index_to_string() {
        let l = Lookup::new().add(
            Rule::new("DRY", MapType::IndexToString, 0x0070)
                .add(0x0000, "")
                .add(0x0010, "1-8 hours")
                .add(0x0070, "22-31 days"),
        );
        assert_eq!(l.translate(0x0071), "22-31 days");
        assert_eq!(l.translate(0x0011), "1-8 hours");
        assert_eq!(l.translate(0x0000), "");
        assert_eq!(l.translate(0x0020), "UNKNOWN_20");
    }

    #[test]
    fn test_tpl_status() {
        assert!(tpl_status_tokens(0x00).is_empty());
        assert_eq!(tpl_status_tokens(0x04), vec!["POWER_LOW"]);
        assert_eq!(
            tpl_status_tokens(0x0B),
            vec!["ALARM".to_string(), "PERMANENT_ERROR".to_string()]
        );
        assert_eq!(tpl_status_tokens(0x20), vec!["UNKNOWN_20"]);
    }
}
