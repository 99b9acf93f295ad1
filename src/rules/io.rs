//! Binary persistence of the rule base.
//!
//! The format is a flat sequence of native-endian integers: a rule count,
//! the fixed-size rule records, a pattern count and the dense pattern map.
//! No version field is embedded; readers validate every count and field
//! against the compiled limits and reject on mismatch.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::RuleError;
use crate::rules::{
    EdgeDatum, EdgeKind, Rule, RuleTable, SonData, SonPath, MAX_NEW_EDGES, MAX_SONS, NEW_CORNERS,
    NRULES, PATTERN_COUNT,
};
use crate::simplex::{CORNERS_OF_ELEM, EDGES_OF_ELEM, SIDES_OF_ELEM};

fn write_i32<W: Write>(w: &mut W, value: i32) -> Result<(), RuleError> {
    w.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn write_i16<W: Write>(w: &mut W, value: i16) -> Result<(), RuleError> {
    w.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, RuleError> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

fn read_i16<R: Read>(r: &mut R) -> Result<i16, RuleError> {
    let mut buf = [0_u8; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_ne_bytes(buf))
}

fn checked_index(field: &'static str, value: i32, limit: usize) -> Result<usize, RuleError> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v < limit)
        .ok_or(RuleError::FieldOutOfRange {
            field,
            value: i64::from(value),
        })
}

fn write_rule<W: Write>(w: &mut W, rule: &Rule) -> Result<(), RuleError> {
    write_i32(w, rule.nsons as i32)?;
    for &bit in &rule.pattern {
        write_i32(w, i32::from(bit))?;
    }
    write_i32(w, i32::from(rule.pat))?;
    for edge in &rule.edges {
        write_i32(w, edge.kind.as_raw())?;
        write_i32(w, i32::from(edge.from))?;
        write_i32(w, i32::from(edge.to))?;
        write_i32(w, i32::from(edge.side))?;
    }
    for son in &rule.sons {
        for &c in &son.corners {
            write_i32(w, i32::from(c))?;
        }
        for &nb in &son.nb {
            write_i32(w, i32::from(nb))?;
        }
        #[allow(clippy::cast_possible_wrap)]
        write_i32(w, son.path.0 as i32)?;
    }
    for entry in &rule.son_and_node {
        match entry {
            Some((s, c)) => {
                write_i32(w, i32::from(*s))?;
                write_i32(w, i32::from(*c))?;
            }
            None => {
                write_i32(w, -1)?;
                write_i32(w, 0)?;
            }
        }
    }
    Ok(())
}

fn read_rule<R: Read>(r: &mut R) -> Result<Rule, RuleError> {
    let mut rule = Rule::default();

    rule.nsons = checked_index("nsons", read_i32(r)?, MAX_SONS + 1)?;

    for e in 0..EDGES_OF_ELEM {
        rule.pattern[e] = match read_i32(r)? {
            0 => false,
            1 => true,
            v => {
                return Err(RuleError::FieldOutOfRange {
                    field: "pattern",
                    value: i64::from(v),
                })
            }
        };
    }

    let pat = read_i32(r)?;
    rule.pat = u8::try_from(pat)
        .ok()
        .filter(|&p| p < 64)
        .ok_or(RuleError::FieldOutOfRange {
            field: "pat",
            value: i64::from(pat),
        })?;

    for e in 0..MAX_NEW_EDGES {
        let kind = read_i32(r)?;
        let kind = EdgeKind::from_raw(kind).ok_or(RuleError::FieldOutOfRange {
            field: "edge type",
            value: i64::from(kind),
        })?;
        let from = checked_index("edge from", read_i32(r)?, 11)?;
        let to = checked_index("edge to", read_i32(r)?, 11)?;
        let side = checked_index("edge side", read_i32(r)?, SIDES_OF_ELEM)?;
        rule.edges[e] = EdgeDatum {
            kind,
            from: from as u8,
            to: to as u8,
            side: side as u8,
        };
    }

    for s in 0..MAX_SONS {
        let mut son = SonData::default();
        for c in 0..CORNERS_OF_ELEM {
            son.corners[c] = checked_index("son corner", read_i32(r)?, 11)? as u8;
        }
        for f in 0..SIDES_OF_ELEM {
            son.nb[f] = checked_index("son neighbor", read_i32(r)?, 24)? as u8;
        }
        #[allow(clippy::cast_sign_loss)]
        {
            son.path = SonPath(read_i32(r)? as u32);
        }
        rule.sons[s] = son;
    }

    for n in 0..NEW_CORNERS {
        let s = read_i32(r)?;
        let c = read_i32(r)?;
        rule.son_and_node[n] = if s < 0 {
            None
        } else {
            let s = checked_index("sonandnode son", s, MAX_SONS)?;
            let c = checked_index("sonandnode corner", c, CORNERS_OF_ELEM)?;
            Some((s as u8, c as u8))
        };
    }

    Ok(rule)
}

impl RuleTable {
    /// Writes the rule base to a file in the native-endian binary format.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RuleError> {
        let mut w = BufWriter::new(File::create(path)?);

        write_i32(&mut w, self.len() as i32)?;
        for rule in self.rules() {
            write_rule(&mut w, rule)?;
        }
        write_i32(&mut w, PATTERN_COUNT as i32)?;
        for &entry in self.pattern_map() {
            write_i16(&mut w, entry)?;
        }
        w.flush().map_err(RuleError::Io)
    }

    /// Reads a rule base saved by [`RuleTable::save`], validating every
    /// count and field.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or when the file does not pass
    /// validation against the compiled limits.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RuleError> {
        let mut r = BufReader::new(File::open(path)?);

        let n_rules = read_i32(&mut r)?;
        let n_rules = usize::try_from(n_rules)
            .ok()
            .filter(|&n| n >= 2 && n <= NRULES)
            .ok_or(RuleError::RuleCountMismatch {
                found: i64::from(n_rules),
                limit: NRULES,
            })?;

        let mut rules = Vec::with_capacity(n_rules);
        for _ in 0..n_rules {
            rules.push(read_rule(&mut r)?);
        }

        let n_patterns = read_i32(&mut r)?;
        if n_patterns != PATTERN_COUNT as i32 {
            return Err(RuleError::PatternCountMismatch {
                found: i64::from(n_patterns),
                expected: PATTERN_COUNT,
            });
        }

        let mut pattern_to_rule = Vec::with_capacity(PATTERN_COUNT);
        for _ in 0..PATTERN_COUNT {
            let entry = read_i16(&mut r)?;
            if entry >= 0 {
                checked_index("pattern map entry", i32::from(entry), n_rules)?;
            }
            pattern_to_rule.push(entry);
        }

        Ok(Self::from_parts(rules, pattern_to_rule))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let table = RuleTable::generate();
        let path = std::env::temp_dir().join("tetref-refrules-roundtrip.data");
        table.save(&path).unwrap();
        let loaded = RuleTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), table.len());
        assert_eq!(loaded.pattern_map(), table.pattern_map());
        for (a, b) in loaded.rules().iter().zip(table.rules()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn truncated_file_is_rejected() {
        let table = RuleTable::generate();
        let path = std::env::temp_dir().join("tetref-refrules-truncated.data");
        table.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(RuleTable::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupt_rule_count_is_rejected() {
        let path = std::env::temp_dir().join("tetref-refrules-badcount.data");
        std::fs::write(&path, 100_000_i32.to_ne_bytes()).unwrap();
        assert!(RuleTable::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
