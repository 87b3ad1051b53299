//! Wire command grammar.
//!
//! One command per line, space-separated tokens, first token is the verb
//! (case-insensitive). List arguments are comma-separated without escaping.

use crate::error::{CacheError, Result};
use crate::series::{SeriesId, Timestamp};

/// Address of a structure instance in the cache tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePath {
    /// Namespace identifier.
    pub namespace: String,
    /// Structure identifier.
    pub structure: String,
    /// Instance key, e.g. `host=a,region=eu`.
    pub instance: String,
}

impl InstancePath {
    fn new(namespace: &str, structure: &str, instance: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            structure: structure.to_string(),
            instance: instance.to_string(),
        }
    }
}

/// A parsed wire command.
///
/// Timestamp lists stay as text so that each series operation reports the
/// offending entry itself; single range bounds are parsed up front.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `PING`
    Ping,

    /// `ALLOC`: register a new series.
    Alloc {
        /// Timestamps of the initial points.
        timestamps: Vec<String>,
        /// Values paired with `timestamps`.
        values: Vec<String>,
    },
    /// `SIZE`: number of points in a series.
    Size {
        /// Target series.
        id: SeriesId,
    },
    /// `GETALL`: every point of a series.
    GetAll {
        /// Target series.
        id: SeriesId,
    },
    /// `GETFROM`: points from a bound to the last point.
    GetFrom {
        /// Target series.
        id: SeriesId,
        /// Inclusive lower bound.
        from: Timestamp,
    },
    /// `GETTO`: points from the first point up to a bound.
    GetTo {
        /// Target series.
        id: SeriesId,
        /// Inclusive upper bound.
        to: Timestamp,
    },
    /// `GETRANGE`: points inside a closed interval.
    GetRange {
        /// Target series.
        id: SeriesId,
        /// Inclusive lower bound.
        from: Timestamp,
        /// Inclusive upper bound.
        to: Timestamp,
    },
    /// `ADD`: insert new points.
    Add {
        /// Target series.
        id: SeriesId,
        /// Timestamps that must not exist yet.
        timestamps: Vec<String>,
        /// Values paired with `timestamps`.
        values: Vec<String>,
    },
    /// `MOD`: overwrite existing points.
    Mod {
        /// Target series.
        id: SeriesId,
        /// Timestamps that must already exist.
        timestamps: Vec<String>,
        /// Replacement values paired with `timestamps`.
        values: Vec<String>,
    },
    /// `DEL`: remove existing points.
    Del {
        /// Target series.
        id: SeriesId,
        /// Timestamps to remove.
        timestamps: Vec<String>,
    },
    /// `FREE`: drop a series.
    Free {
        /// Target series.
        id: SeriesId,
    },
    /// `GRID`: render a series on a fixed tick.
    Grid {
        /// Target series.
        id: SeriesId,
        /// Tick text such as `1d` or `15m`.
        tick: String,
        /// Value written to empty slots.
        null_value: String,
    },

    /// `NSADD`
    NsAdd {
        /// Namespace to create.
        namespace: String,
    },
    /// `NSREN`
    NsRename {
        /// Current namespace name.
        old: String,
        /// New namespace name.
        new: String,
    },
    /// `NSDEL`: drop a namespace and its subtree.
    NsRemove {
        /// Namespace to remove.
        namespace: String,
    },
    /// `NSLIST`
    NsList,

    /// `STADD`
    StAdd {
        /// Parent namespace.
        namespace: String,
        /// Structure to create.
        structure: String,
        /// Comma-separated attribute names.
        definition: String,
    },
    /// `STREN`
    StRename {
        /// Parent namespace.
        namespace: String,
        /// Current structure name.
        old: String,
        /// New structure name.
        new: String,
    },
    /// `STDEL`: drop a structure and its instances.
    StRemove {
        /// Parent namespace.
        namespace: String,
        /// Structure to remove.
        structure: String,
    },
    /// `STLIST`
    StList {
        /// Namespace whose structures are listed.
        namespace: String,
    },

    /// `INADD`: create an instance, optionally with initial points.
    InAdd {
        /// Instance to create.
        path: InstancePath,
        /// Initial timestamps and values.
        points: Option<(Vec<String>, Vec<String>)>,
    },
    /// `INDEL`
    InRemove {
        /// Instance to remove.
        path: InstancePath,
    },
    /// `INLIST`
    InList {
        /// Parent namespace.
        namespace: String,
        /// Structure whose instances are listed.
        structure: String,
    },

    /// `TSGET`
    TsGet {
        /// Instance holding the series.
        path: InstancePath,
    },
    /// `TSFROM`
    TsFrom {
        /// Instance holding the series.
        path: InstancePath,
        /// Inclusive lower bound.
        from: Timestamp,
    },
    /// `TSTO`
    TsTo {
        /// Instance holding the series.
        path: InstancePath,
        /// Inclusive upper bound.
        to: Timestamp,
    },
    /// `TSRANGE`
    TsRange {
        /// Instance holding the series.
        path: InstancePath,
        /// Inclusive lower bound.
        from: Timestamp,
        /// Inclusive upper bound.
        to: Timestamp,
    },
    /// `TSADD`
    TsAdd {
        /// Instance holding the series.
        path: InstancePath,
        /// Timestamps that must not exist yet.
        timestamps: Vec<String>,
        /// Values paired with `timestamps`.
        values: Vec<String>,
    },
    /// `TSMOD`
    TsMod {
        /// Instance holding the series.
        path: InstancePath,
        /// Timestamps that must already exist.
        timestamps: Vec<String>,
        /// Replacement values paired with `timestamps`.
        values: Vec<String>,
    },
    /// `TSDEL`
    TsDel {
        /// Instance holding the series.
        path: InstancePath,
        /// Timestamps to remove.
        timestamps: Vec<String>,
    },
}

/// Returns the argument synopsis of a known verb.
pub fn usage(verb: &str) -> Option<&'static str> {
    let synopsis = match verb {
        "PING" => "PING",
        "ALLOC" => "ALLOC <timestamps> <values>",
        "SIZE" => "SIZE <id>",
        "GETALL" => "GETALL <id>",
        "GETFROM" => "GETFROM <id> <from>",
        "GETTO" => "GETTO <id> <to>",
        "GETRANGE" => "GETRANGE <id> <from> <to>",
        "ADD" => "ADD <id> <timestamps> <values>",
        "MOD" => "MOD <id> <timestamps> <values>",
        "DEL" => "DEL <id> <timestamps>",
        "FREE" => "FREE <id>",
        "GRID" => "GRID <id> <tick> <null>",
        "NSADD" => "NSADD <namespace>",
        "NSREN" => "NSREN <old> <new>",
        "NSDEL" => "NSDEL <namespace>",
        "NSLIST" => "NSLIST",
        "STADD" => "STADD <namespace> <structure> <definition>",
        "STREN" => "STREN <namespace> <old> <new>",
        "STDEL" => "STDEL <namespace> <structure>",
        "STLIST" => "STLIST <namespace>",
        "INADD" => "INADD <namespace> <structure> <instance> [<timestamps> <values>]",
        "INDEL" => "INDEL <namespace> <structure> <instance>",
        "INLIST" => "INLIST <namespace> <structure>",
        "TSGET" => "TSGET <namespace> <structure> <instance>",
        "TSFROM" => "TSFROM <namespace> <structure> <instance> <from>",
        "TSTO" => "TSTO <namespace> <structure> <instance> <to>",
        "TSRANGE" => "TSRANGE <namespace> <structure> <instance> <from> <to>",
        "TSADD" => "TSADD <namespace> <structure> <instance> <timestamps> <values>",
        "TSMOD" => "TSMOD <namespace> <structure> <instance> <timestamps> <values>",
        "TSDEL" => "TSDEL <namespace> <structure> <instance> <timestamps>",
        _ => return None,
    };
    Some(synopsis)
}

fn list(arg: &str) -> Vec<String> {
    arg.split(',').map(str::to_string).collect()
}

fn series_id(verb: &str, arg: &str) -> Result<SeriesId> {
    arg.parse().map_err(|_| {
        CacheError::UsageError(format!(
            "{} (id must be an unsigned integer, got '{arg}')",
            usage(verb).unwrap_or(verb)
        ))
    })
}

fn timestamp(arg: &str) -> Result<Timestamp> {
    arg.parse()
}

impl Command {
    /// Parses one request line.
    ///
    /// # Errors
    ///
    /// - `CacheError::UsageError` for an empty line, a wrong argument count
    ///   or a non-numeric series ID
    /// - `CacheError::CommandNotSupported` for an unknown verb
    /// - `CacheError::InvalidFormat` for a malformed range bound
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let Some(raw_verb) = tokens.next() else {
            return Err(CacheError::UsageError("<verb> [args...]".to_string()));
        };
        let verb = raw_verb.to_ascii_uppercase();
        let args: Vec<&str> = tokens.collect();
        let v = verb.as_str();

        let command = match (v, args.as_slice()) {
            ("PING", []) => Self::Ping,

            ("ALLOC", [ts, vals]) => Self::Alloc {
                timestamps: list(ts),
                values: list(vals),
            },
            ("SIZE", [id]) => Self::Size {
                id: series_id(v, id)?,
            },
            ("GETALL", [id]) => Self::GetAll {
                id: series_id(v, id)?,
            },
            ("GETFROM", [id, from]) => Self::GetFrom {
                id: series_id(v, id)?,
                from: timestamp(from)?,
            },
            ("GETTO", [id, to]) => Self::GetTo {
                id: series_id(v, id)?,
                to: timestamp(to)?,
            },
            ("GETRANGE", [id, from, to]) => Self::GetRange {
                id: series_id(v, id)?,
                from: timestamp(from)?,
                to: timestamp(to)?,
            },
            ("ADD", [id, ts, vals]) => Self::Add {
                id: series_id(v, id)?,
                timestamps: list(ts),
                values: list(vals),
            },
            ("MOD", [id, ts, vals]) => Self::Mod {
                id: series_id(v, id)?,
                timestamps: list(ts),
                values: list(vals),
            },
            ("DEL", [id, ts]) => Self::Del {
                id: series_id(v, id)?,
                timestamps: list(ts),
            },
            ("FREE", [id]) => Self::Free {
                id: series_id(v, id)?,
            },
            ("GRID", [id, tick, null]) => Self::Grid {
                id: series_id(v, id)?,
                tick: tick.to_string(),
                null_value: null.to_string(),
            },

            ("NSADD", [ns]) => Self::NsAdd {
                namespace: ns.to_string(),
            },
            ("NSREN", [old, new]) => Self::NsRename {
                old: old.to_string(),
                new: new.to_string(),
            },
            ("NSDEL", [ns]) => Self::NsRemove {
                namespace: ns.to_string(),
            },
            ("NSLIST", []) => Self::NsList,

            ("STADD", [ns, st, def]) => Self::StAdd {
                namespace: ns.to_string(),
                structure: st.to_string(),
                definition: def.to_string(),
            },
            ("STREN", [ns, old, new]) => Self::StRename {
                namespace: ns.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            },
            ("STDEL", [ns, st]) => Self::StRemove {
                namespace: ns.to_string(),
                structure: st.to_string(),
            },
            ("STLIST", [ns]) => Self::StList {
                namespace: ns.to_string(),
            },

            ("INADD", [ns, st, key]) => Self::InAdd {
                path: InstancePath::new(ns, st, key),
                points: None,
            },
            ("INADD", [ns, st, key, ts, vals]) => Self::InAdd {
                path: InstancePath::new(ns, st, key),
                points: Some((list(ts), list(vals))),
            },
            ("INDEL", [ns, st, key]) => Self::InRemove {
                path: InstancePath::new(ns, st, key),
            },
            ("INLIST", [ns, st]) => Self::InList {
                namespace: ns.to_string(),
                structure: st.to_string(),
            },

            ("TSGET", [ns, st, key]) => Self::TsGet {
                path: InstancePath::new(ns, st, key),
            },
            ("TSFROM", [ns, st, key, from]) => Self::TsFrom {
                path: InstancePath::new(ns, st, key),
                from: timestamp(from)?,
            },
            ("TSTO", [ns, st, key, to]) => Self::TsTo {
                path: InstancePath::new(ns, st, key),
                to: timestamp(to)?,
            },
            ("TSRANGE", [ns, st, key, from, to]) => Self::TsRange {
                path: InstancePath::new(ns, st, key),
                from: timestamp(from)?,
                to: timestamp(to)?,
            },
            ("TSADD", [ns, st, key, ts, vals]) => Self::TsAdd {
                path: InstancePath::new(ns, st, key),
                timestamps: list(ts),
                values: list(vals),
            },
            ("TSMOD", [ns, st, key, ts, vals]) => Self::TsMod {
                path: InstancePath::new(ns, st, key),
                timestamps: list(ts),
                values: list(vals),
            },
            ("TSDEL", [ns, st, key, ts]) => Self::TsDel {
                path: InstancePath::new(ns, st, key),
                timestamps: list(ts),
            },

            (known, _) => {
                return Err(match usage(known) {
                    Some(synopsis) => CacheError::UsageError(synopsis.to_string()),
                    None => CacheError::CommandNotSupported(raw_verb.to_string()),
                })
            }
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbs_are_case_insensitive() {
        assert_eq!(Command::parse("ping").unwrap(), Command::Ping);
        assert_eq!(Command::parse("PiNg").unwrap(), Command::Ping);
        assert_eq!(Command::parse("size 7").unwrap(), Command::Size { id: 7 });
    }

    #[test]
    fn test_alloc_splits_lists() {
        let command = Command::parse(
            "ALLOC 2010-01-01T12:00:00.000+05:30,2010-01-02T12:00:00.000+05:30 UP,DOWN",
        )
        .unwrap();
        assert_eq!(
            command,
            Command::Alloc {
                timestamps: vec![
                    "2010-01-01T12:00:00.000+05:30".to_string(),
                    "2010-01-02T12:00:00.000+05:30".to_string()
                ],
                values: vec!["UP".to_string(), "DOWN".to_string()],
            }
        );
    }

    #[test]
    fn test_wrong_arg_count_is_usage_error() {
        for line in ["ALLOC a", "SIZE", "SIZE 1 2", "PING extra", "DEL 1", "INADD ns st"] {
            let err = Command::parse(line).unwrap_err();
            assert_eq!(err.kind(), "UsageError", "line {line}");
        }
        let err = Command::parse("ALLOC only_one").unwrap_err();
        assert_eq!(err.to_string(), "Usage: ALLOC <timestamps> <values>");
    }

    #[test]
    fn test_empty_line_is_usage_error() {
        assert_eq!(Command::parse("").unwrap_err().kind(), "UsageError");
        assert_eq!(Command::parse("   \t").unwrap_err().kind(), "UsageError");
    }

    #[test]
    fn test_unknown_verb() {
        let err = Command::parse("FROB 1 2").unwrap_err();
        assert!(matches!(err, CacheError::CommandNotSupported(ref verb) if verb == "FROB"));
    }

    #[test]
    fn test_non_numeric_id() {
        let err = Command::parse("GETALL abc").unwrap_err();
        assert_eq!(err.kind(), "UsageError");
    }

    #[test]
    fn test_range_bounds_are_parsed() {
        let err = Command::parse("GETFROM 1 yesterday").unwrap_err();
        assert_eq!(err.kind(), "InvalidFormat");

        let command = Command::parse("GETFROM 1 2010-01-01T12:00:00.000+05:30").unwrap();
        assert!(matches!(command, Command::GetFrom { id: 1, .. }));
    }

    #[test]
    fn test_inadd_optional_points() {
        let bare = Command::parse("INADD foo bar baz=1,boo=2").unwrap();
        assert!(matches!(bare, Command::InAdd { points: None, .. }));

        let seeded =
            Command::parse("INADD foo bar baz=1,boo=2 2010-01-01T12:00:00.000+05:30 UP").unwrap();
        match seeded {
            Command::InAdd {
                path,
                points: Some((timestamps, values)),
            } => {
                assert_eq!(path.instance, "baz=1,boo=2");
                assert_eq!(timestamps.len(), 1);
                assert_eq!(values, vec!["UP".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_every_verb_has_usage() {
        for verb in ["PING", "ALLOC", "GRID", "NSLIST", "STADD", "INLIST", "TSDEL"] {
            assert!(usage(verb).is_some());
        }
        assert!(usage("NOPE").is_none());
    }
}
