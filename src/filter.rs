//! Compiled (object, wildcard name) matcher shared by every bulk operation.
//!
//! Patterns are ASCII globs: `*` matches any run of characters (so
//! `CPU/*` covers every metric below `CPU/`), `?` matches one character.
//! A pattern ending in a bare `:` matches only names without an aggregate
//! suffix, so `*:` selects raw series and `*:avg` selects averages.
//! Several patterns may be given in one string separated by commas.

use crate::aggregate::Aggregate;
use crate::errors::{MetricsError, Result};
use crate::object::ObjectId;

#[derive(Debug, Clone)]
pub struct Filter {
    elements: Vec<(Option<ObjectId>, String)>,
}

impl Filter {
    /// Match every metric of every object.
    pub fn all() -> Self {
        Self {
            elements: vec![(None, "*".to_string())],
        }
    }

    /// Cross product of `names` and `objects`; empty lists mean "all".
    pub fn new(names: &[&str], objects: &[ObjectId]) -> Result<Self> {
        let mut filter = Self { elements: Vec::new() };
        let names: &[&str] = if names.is_empty() { &["*"] } else { names };
        if objects.is_empty() {
            for name in names {
                filter.push_list(None, name)?;
            }
        } else {
            for object in objects {
                for name in names {
                    filter.push_list(Some(object.clone()), name)?;
                }
            }
        }
        Ok(filter)
    }

    pub fn single(name: &str, object: Option<ObjectId>) -> Result<Self> {
        let mut filter = Self { elements: Vec::new() };
        filter.push_list(object, name)?;
        Ok(filter)
    }

    /// Every metric of one object.
    pub fn object(object: ObjectId) -> Self {
        Self {
            elements: vec![(Some(object), "*".to_string())],
        }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Option<ObjectId>, S)>,
        S: AsRef<str>,
    {
        let mut filter = Self { elements: Vec::new() };
        for (object, name) in pairs {
            filter.push_list(object, name.as_ref())?;
        }
        if filter.elements.is_empty() {
            return Ok(Self::all());
        }
        Ok(filter)
    }

    fn push_list(&mut self, object: Option<ObjectId>, list: &str) -> Result<()> {
        // an empty entry stays a pattern that no metric name matches
        if list.is_empty() {
            self.elements.push((object, String::new()));
            return Ok(());
        }
        for pattern in list.split(',') {
            validate_pattern(pattern)?;
            self.elements.push((object.clone(), pattern.to_string()));
        }
        Ok(())
    }

    pub fn matches(&self, object: &ObjectId, name: &str) -> bool {
        self.elements.iter().any(|(obj, pattern)| {
            obj.as_ref().map_or(true, |o| o == object)
                && pattern_match(pattern.as_bytes(), name.as_bytes(), false)
        })
    }
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(MetricsError::InvalidFilterArgument(
            "empty metric name in list".into(),
        ));
    }
    if !pattern.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(MetricsError::InvalidFilterArgument(format!(
            "metric name {pattern:?} must be printable ASCII without spaces"
        )));
    }
    if let Some((_, suffix)) = pattern.rsplit_once(':') {
        let wild = suffix.contains(['*', '?']);
        if !suffix.is_empty() && !wild && Aggregate::from_name(suffix).is_none() {
            return Err(MetricsError::InvalidFilterArgument(format!(
                "unknown aggregate {suffix:?} in {pattern:?}"
            )));
        }
    }
    Ok(())
}

fn pattern_match(pat: &[u8], name: &[u8], mut seen_colon: bool) -> bool {
    let mut p = 0;
    let mut n = 0;
    loop {
        match pat.get(p) {
            None => return n == name.len(),
            Some(b'*') => {
                p += 1;
                while matches!(pat.get(p), Some(b'*') | Some(b'?')) {
                    p += 1;
                }
                let next = pat.get(p).copied();
                if next == Some(b':') {
                    if !seen_colon && p + 1 == pat.len() {
                        return !name[n..].contains(&b':');
                    }
                    seen_colon = true;
                }
                loop {
                    let ch = name.get(n).copied();
                    n += 1;
                    if ch == next
                        && (next.is_none() || pattern_match(&pat[p + 1..], &name[n..], seen_colon))
                    {
                        return true;
                    }
                    if ch.is_none() {
                        return false;
                    }
                }
            }
            Some(b'?') => {
                if n >= name.len() {
                    return false;
                }
            }
            Some(b':') => {
                if !seen_colon && p + 1 == pat.len() {
                    return n == name.len();
                }
                if name.get(n) != Some(&b':') {
                    return false;
                }
                seen_colon = true;
            }
            Some(c) => {
                if name.get(n) != Some(c) {
                    return false;
                }
            }
        }
        p += 1;
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ObjectId {
        ObjectId::host("h1")
    }

    fn vm() -> ObjectId {
        ObjectId::machine("vm1")
    }

    #[test]
    fn test_empty_names_match_everything() {
        let f = Filter::new(&[], &[]).unwrap();
        for name in ["CPU/Load/User", "RAM/Usage/Free:max", "Net/eth0/Load/Rx"] {
            assert!(f.matches(&host(), name));
            assert!(f.matches(&vm(), name));
        }
    }

    #[test]
    fn test_star_matches_everything_for_object() {
        let f = Filter::new(&["*"], &[vm()]).unwrap();
        assert!(f.matches(&vm(), "Guest/RAM/Usage/Total:avg"));
        assert!(!f.matches(&host(), "CPU/Load/User"));
    }

    #[test]
    fn test_prefix_wildcard() {
        let f = Filter::single("CPU/*", None).unwrap();
        assert!(f.matches(&host(), "CPU/Load/User"));
        assert!(f.matches(&host(), "CPU/MHz:avg"));
        assert!(!f.matches(&host(), "RAM/Usage"));
    }

    #[test]
    fn test_trailing_colon_selects_raw_series() {
        let f = Filter::single("*:", None).unwrap();
        assert!(f.matches(&host(), "CPU/Load/User"));
        assert!(!f.matches(&host(), "CPU/Load/User:avg"));

        let f = Filter::single("CPU/Load/User:", None).unwrap();
        assert!(f.matches(&host(), "CPU/Load/User"));
        assert!(!f.matches(&host(), "CPU/Load/User:min"));
    }

    #[test]
    fn test_aggregate_suffix_is_matchable() {
        let f = Filter::single("*:avg", None).unwrap();
        assert!(f.matches(&host(), "RAM/Usage/Used:avg"));
        assert!(!f.matches(&host(), "RAM/Usage/Used:max"));
        assert!(!f.matches(&host(), "RAM/Usage/Used"));
    }

    #[test]
    fn test_inner_segment_wildcard() {
        let f = Filter::single("Net/*/Load/Rx", None).unwrap();
        assert!(f.matches(&host(), "Net/eth0/Load/Rx"));
        assert!(!f.matches(&host(), "Net/eth0/Load/Tx"));
    }

    #[test]
    fn test_question_mark() {
        let f = Filter::single("Disk/sd?/Load/Util", None).unwrap();
        assert!(f.matches(&host(), "Disk/sda/Load/Util"));
        assert!(!f.matches(&host(), "Disk/nvme0n1/Load/Util"));
    }

    #[test]
    fn test_comma_list() {
        let f = Filter::single("CPU/Load,RAM/Usage", Some(host())).unwrap();
        assert!(f.matches(&host(), "CPU/Load"));
        assert!(f.matches(&host(), "RAM/Usage"));
        assert!(!f.matches(&host(), "CPU/MHz"));
        assert!(!f.matches(&vm(), "CPU/Load"));
    }

    #[test]
    fn test_pairs_bind_objects_individually() {
        let f = Filter::from_pairs([(Some(host()), "CPU/*"), (Some(vm()), "RAM/*")]).unwrap();
        assert!(f.matches(&host(), "CPU/Load/User"));
        assert!(!f.matches(&host(), "RAM/Usage/Used"));
        assert!(f.matches(&vm(), "RAM/Usage/Used"));
    }

    #[test]
    fn test_malformed_names_are_rejected() {
        assert!(Filter::single("CPU/Load,,RAM/Usage", None).is_err());
        assert!(Filter::single("CPU Load", None).is_err());
        assert!(Filter::single("CPU/Load/User:median", None).is_err());
        assert!(Filter::new(&["CPU/*", ""], &[]).is_ok());
    }

    #[test]
    fn test_empty_entry_does_not_widen() {
        let f = Filter::new(&["CPU/*", ""], &[]).unwrap();
        assert!(f.matches(&host(), "CPU/Load/User"));
        assert!(!f.matches(&host(), "RAM/Usage/Used"));

        let f = Filter::new(&[""], &[vm()]).unwrap();
        assert!(!f.matches(&vm(), "CPU/Load/User"));
    }
}
