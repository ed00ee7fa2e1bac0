//! Keystroke scripts and version-dependent menu selection.
//!
//! The appliance's text menu renumbered its options between releases, so
//! the keystroke path for a task depends on the appliance version.
//! [`VersionPolicy`] holds that mapping as an explicit table: each rule
//! names a purpose, a version floor, and the token sequence to replay.
//! New breakpoints are added as new rules, not new branches.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Token whose menu step saves the configuration to disk. That step can
/// take minutes, so it carries its own read timeout.
pub const PERSIST_TOKEN: &str = "w";

/// Read timeout substituted for the persist token.
pub const PERSIST_TIMEOUT: Duration = Duration::from_secs(300);

/// Menu release where the option indices shifted.
const MENU_BREAKPOINT: &str = "5.10";

// =============================================================================
// VERSION
// =============================================================================

/// Dotted release version, compared numerically component by component
/// with missing components treated as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(Vec<u32>);

impl Version {
    /// Parse the leading numeric components of a version string.
    ///
    /// Trailing non-numeric pieces (build tags like `5.11.0.1-1`) are
    /// dropped; a string with no leading numeric component parses to
    /// `None`.
    pub fn parse(text: &str) -> Option<Version> {
        let mut parts = Vec::new();
        for piece in text.split('.') {
            match piece.parse::<u32>() {
                Ok(n) => parts.push(n),
                Err(_) => {
                    // Salvage a numeric prefix like the "1" in "1-1".
                    let digits: String =
                        piece.chars().take_while(|c| c.is_ascii_digit()).collect();
                    if let Ok(n) = digits.parse::<u32>() {
                        parts.push(n);
                    }
                    break;
                }
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Version(parts))
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", text.join("."))
    }
}

// =============================================================================
// SCRIPTS
// =============================================================================

/// What a scripted session is trying to accomplish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Walk the database setup menu and create the internal database.
    ConfigureDatabase,
    /// Restart the appliance's server process from the menu.
    RestartServer,
}

/// One keystroke to replay, with an optional read-timeout override.
#[derive(Debug, Clone)]
pub struct Keystroke {
    token: String,
    /// Overrides the driver's base read timeout when set.
    pub timeout: Option<Duration>,
}

impl Keystroke {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// An ordered keystroke script.
#[derive(Debug, Clone)]
pub struct ScriptedSequence {
    keystrokes: Vec<Keystroke>,
}

impl ScriptedSequence {
    /// Build a sequence from plain tokens. The persist token automatically
    /// picks up its extended timeout.
    pub fn from_tokens(tokens: &[&str]) -> Self {
        let keystrokes = tokens
            .iter()
            .map(|token| {
                let keystroke = Keystroke::new(*token);
                if *token == PERSIST_TOKEN {
                    keystroke.with_timeout(PERSIST_TIMEOUT)
                } else {
                    keystroke
                }
            })
            .collect();
        Self { keystrokes }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keystroke> {
        self.keystrokes.iter()
    }

    pub fn len(&self) -> usize {
        self.keystrokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keystrokes.is_empty()
    }

    /// The raw tokens, in order.
    pub fn tokens(&self) -> Vec<&str> {
        self.keystrokes.iter().map(Keystroke::token).collect()
    }
}

// =============================================================================
// POLICY
// =============================================================================

struct Rule {
    purpose: Purpose,
    /// Lowest version this sequence applies to; `None` is the base layout.
    since: Option<Version>,
    tokens: &'static [&'static str],
}

/// Version-to-script table.
pub struct VersionPolicy {
    rules: Vec<Rule>,
}

impl VersionPolicy {
    pub fn new() -> Self {
        let breakpoint = Version::parse(MENU_BREAKPOINT);
        Self {
            rules: vec![
                Rule {
                    purpose: Purpose::ConfigureDatabase,
                    since: None,
                    tokens: &["ap", "", "5", "1", "1", "1", "N", "0", "smartvm", "smartvm", "w"],
                },
                Rule {
                    purpose: Purpose::ConfigureDatabase,
                    since: breakpoint.clone(),
                    tokens: &["ap", "", "7", "1", "1", "1", "N", "0", "smartvm", "smartvm", "w"],
                },
                Rule {
                    purpose: Purpose::RestartServer,
                    since: None,
                    tokens: &["ap", "", "15", "Y", ""],
                },
                Rule {
                    purpose: Purpose::RestartServer,
                    since: breakpoint,
                    tokens: &["ap", "", "17", "Y", ""],
                },
            ],
        }
    }

    /// Select the script for `purpose` on an appliance at `version`.
    ///
    /// The applicable rule with the highest version floor wins. Versions
    /// that do not parse are assumed to be newer than every breakpoint.
    pub fn sequence_for(&self, purpose: Purpose, version: &str) -> ScriptedSequence {
        let parsed = Version::parse(version);
        let mut best: Option<&Rule> = None;

        for rule in self.rules.iter().filter(|r| r.purpose == purpose) {
            let applies = match (&rule.since, &parsed) {
                (None, _) => true,
                (Some(floor), Some(version)) => version >= floor,
                (Some(_), None) => true,
            };
            if !applies {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => rule.since > current.since,
            };
            if better {
                best = Some(rule);
            }
        }

        match best {
            Some(rule) => ScriptedSequence::from_tokens(rule.tokens),
            // Unreachable with the built-in table; an empty script is the
            // safe answer for a purpose with no rules.
            None => ScriptedSequence { keystrokes: Vec::new() },
        }
    }
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_numerically() {
        let v59 = Version::parse("5.9").unwrap();
        let v510 = Version::parse("5.10").unwrap();
        let v511 = Version::parse("5.11").unwrap();

        assert!(v59 < v510);
        assert!(v510 < v511);
        assert!(Version::parse("5.9.0.22").unwrap() < v510);
        assert!(Version::parse("5.10.0.1").unwrap() >= v510);
        assert_eq!(Version::parse("5.10.0").unwrap().cmp(&v510), Ordering::Equal);
    }

    #[test]
    fn version_parse_tolerates_build_tags() {
        let version = Version::parse("5.11.0.1-1").unwrap();
        assert!(version >= Version::parse("5.10").unwrap());
        assert_eq!(version.to_string(), "5.11.0.1");

        assert_eq!(Version::parse("nightly"), None);
    }

    #[test]
    fn database_menu_index_shifts_at_breakpoint() {
        let policy = VersionPolicy::new();

        let old = policy.sequence_for(Purpose::ConfigureDatabase, "5.9");
        assert_eq!(
            old.tokens(),
            vec!["ap", "", "5", "1", "1", "1", "N", "0", "smartvm", "smartvm", "w"]
        );

        let new = policy.sequence_for(Purpose::ConfigureDatabase, "5.11");
        assert_eq!(
            new.tokens(),
            vec!["ap", "", "7", "1", "1", "1", "N", "0", "smartvm", "smartvm", "w"]
        );

        // The breakpoint itself uses the shifted layout.
        let at = policy.sequence_for(Purpose::ConfigureDatabase, "5.10");
        assert_eq!(at.tokens()[2], "7");
    }

    #[test]
    fn restart_menu_index_shifts_at_breakpoint() {
        let policy = VersionPolicy::new();

        let old = policy.sequence_for(Purpose::RestartServer, "5.9.0.1");
        assert_eq!(old.tokens(), vec!["ap", "", "15", "Y", ""]);

        let new = policy.sequence_for(Purpose::RestartServer, "5.11.0.1");
        assert_eq!(new.tokens(), vec!["ap", "", "17", "Y", ""]);
    }

    #[test]
    fn unparseable_versions_use_newest_layout() {
        let policy = VersionPolicy::new();

        let sequence = policy.sequence_for(Purpose::ConfigureDatabase, "master");
        assert_eq!(sequence.tokens()[2], "7");
    }

    #[test]
    fn persist_token_carries_save_timeout() {
        let policy = VersionPolicy::new();
        let sequence = policy.sequence_for(Purpose::ConfigureDatabase, "5.9");

        let persist = sequence
            .iter()
            .find(|k| k.token() == PERSIST_TOKEN)
            .unwrap();
        assert_eq!(persist.timeout, Some(PERSIST_TIMEOUT));

        let regular = sequence.iter().find(|k| k.token() == "ap").unwrap();
        assert_eq!(regular.timeout, None);
    }
}
