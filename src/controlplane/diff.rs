//! Desired versus observed comparison
//!
//! Builds the `(up_to_date, diff)` pair returned by every `is_up_to_date`.
//! A desired value of `None` expresses no opinion and never differs.

use std::fmt::{self, Display, Write};

/// Accumulates differing fields, one `field: -desired +observed` line each.
#[derive(Debug, Default)]
pub struct Diff {
    out: String,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a field the desired state always has an opinion on.
    pub fn exact<T>(&mut self, field: &str, desired: &T, observed: &T) -> &mut Self
    where
        T: PartialEq + Display + ?Sized,
    {
        if desired != observed {
            // Writing to a String cannot fail
            let _ = writeln!(self.out, "{}: -{} +{}", field, desired, observed);
        }
        self
    }

    /// Compare a field only when the desired state sets it.
    pub fn optional<T>(&mut self, field: &str, desired: Option<&T>, observed: &T) -> &mut Self
    where
        T: PartialEq + Display + ?Sized,
    {
        match desired {
            Some(desired) => self.exact(field, desired, observed),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(&mut self) -> (bool, String) {
        let diff = std::mem::take(&mut self.out);
        (diff.is_empty(), diff)
    }
}

/// Renders a limit where `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit<T>(pub Option<T>);

impl<T: Display> Display for Limit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("unlimited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_opinion_never_differs() {
        let (up_to_date, diff) = Diff::new()
            .optional::<str>("groupName", None, "")
            .optional::<bool>("ldapEnabled", None, &true)
            .finish();

        assert!(up_to_date);
        assert_eq!(diff, "");
    }

    #[test]
    fn test_lines_per_field() {
        let (up_to_date, diff) = Diff::new()
            .exact("groupId", "QA", "QA")
            .exact("active", &true, &false)
            .optional("groupName", Some("X"), "")
            .finish();

        assert!(!up_to_date);
        assert_eq!(diff, "active: -true +false\ngroupName: -X +\n");
    }

    #[test]
    fn test_limit_display() {
        assert_eq!(Limit(Some(42)).to_string(), "42");
        assert_eq!(Limit::<u64>(None).to_string(), "unlimited");
    }
}
