//! Version constraints such as `>=1.5.0,<2.5.0`.
//!
//! Clauses are joined by commas and must all hold. A clause without an
//! operator means equality. When either side fails to parse as a version,
//! only equality clauses are checked, by plain string comparison; ordering
//! clauses are then considered satisfied.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Qualifier {
    Alpha(u64),
    Beta(u64),
    Milestone(u64),
    Rc(u64),
    Snapshot,
    Release,
    Sp(u64),
}

impl Qualifier {
    fn rank(&self) -> (u8, u64) {
        match self {
            Self::Alpha(n) => (0, *n),
            Self::Beta(n) => (1, *n),
            Self::Milestone(n) => (2, *n),
            Self::Rc(n) => (3, *n),
            Self::Snapshot => (4, 0),
            Self::Release => (5, 0),
            Self::Sp(n) => (6, *n),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let q = raw.to_ascii_lowercase();
        if matches!(q.as_str(), "" | "final" | "ga" | "release") {
            return Some(Self::Release);
        }
        if q == "snapshot" {
            return Some(Self::Snapshot);
        }
        let prefixes: [(&str, fn(u64) -> Self); 9] = [
            ("alpha", Self::Alpha),
            ("beta", Self::Beta),
            ("milestone", Self::Milestone),
            ("rc", Self::Rc),
            ("cr", Self::Rc),
            ("sp", Self::Sp),
            ("a", Self::Alpha),
            ("b", Self::Beta),
            ("m", Self::Milestone),
        ];
        for (prefix, make) in prefixes {
            if let Some(rest) = q.strip_prefix(prefix) {
                let digits = rest.trim_start_matches(['-', '.']);
                if digits.is_empty() {
                    return Some(make(0));
                }
                if let Ok(n) = digits.parse() {
                    return Some(make(n));
                }
            }
        }
        None
    }
}

/// A numeric release (`1.2.3`) with an optional Maven-style qualifier
/// (`-rc1`, `.RELEASE`, `-SNAPSHOT`). Trailing zero segments are not
/// significant, so `1.0` equals `1.0.0`.
#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
    qualifier: Qualifier,
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix(['v', 'V']).unwrap_or(s);
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (numeric, rest) = s.split_at(split);

        // `1.0.RELEASE` leaves a trailing dot on the numeric part.
        let numeric_trimmed = numeric.strip_suffix('.').unwrap_or(numeric);
        let dotted_qualifier = numeric_trimmed.len() != numeric.len();
        if numeric_trimmed.is_empty() || (dotted_qualifier && rest.is_empty()) {
            return Err(format!("not a version: {s}"));
        }

        let release = numeric_trimmed
            .split('.')
            .map(|seg| seg.parse::<u64>().map_err(|_| format!("not a version: {s}")))
            .collect::<Result<Vec<_>, _>>()?;

        // `1.0-rc1`, `1.0.RELEASE` and `1.0rc1` all name the same qualifier.
        let qualifier_raw = if dotted_qualifier {
            rest
        } else {
            rest.strip_prefix('-').unwrap_or(rest)
        };
        let qualifier = Qualifier::parse(qualifier_raw).ok_or_else(|| format!("not a version: {s}"))?;
        Ok(Self { release, qualifier })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.qualifier.rank().cmp(&other.qualifier.rank())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Op,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilter {
    constraints: Vec<Constraint>,
}

impl VersionFilter {
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, version: &str) -> bool {
        let parsed: Option<(Version, Vec<Version>)> = version.parse::<Version>().ok().and_then(|v| {
            self.constraints
                .iter()
                .map(|c| c.version.parse::<Version>().ok())
                .collect::<Option<Vec<_>>>()
                .map(|cs| (v, cs))
        });

        match parsed {
            Some((v, bounds)) => self
                .constraints
                .iter()
                .zip(bounds.iter())
                .all(|(c, bound)| c.op.holds(v.cmp(bound))),
            None => self
                .constraints
                .iter()
                .filter(|c| c.op == Op::Eq)
                .all(|c| c.version == version),
        }
    }
}

impl FromStr for VersionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut constraints = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (op, rest) = if let Some(r) = part.strip_prefix(">=") {
                (Op::Ge, r)
            } else if let Some(r) = part.strip_prefix("<=") {
                (Op::Le, r)
            } else if let Some(r) = part.strip_prefix("==") {
                (Op::Eq, r)
            } else if let Some(r) = part.strip_prefix('>') {
                (Op::Gt, r)
            } else if let Some(r) = part.strip_prefix('<') {
                (Op::Lt, r)
            } else if let Some(r) = part.strip_prefix('=') {
                (Op::Eq, r)
            } else {
                (Op::Eq, part)
            };
            let version = rest.trim();
            if version.is_empty() {
                return Err(format!("missing version after '{}' in '{s}'", op.symbol()));
            }
            constraints.push(Constraint {
                op,
                version: version.to_string(),
            });
        }
        Ok(Self { constraints })
    }
}

impl fmt::Display for VersionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{}{}", c.op.symbol(), c.version))
            .collect();
        f.write_str(&parts.join(","))
    }
}
