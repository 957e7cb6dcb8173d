//! The BBC BASIC keyword table and the abbreviation table, transcribed
//! from the reference tokeniser's `KeyWordTable`/`AbbreviationTable`
//! (BASIC ROM User Guide pages 41-43) with the original 6-bit flag byte
//! replaced by a struct of named booleans. Token bytes are the table's
//! actual `0x80..0xFF` positions, not sequentially reassigned, because
//! external tools and the ROM itself depend on the exact values (e.g.
//! `PRINT` is always `0xF1`, `GOTO` is always `0xE5`).

use std::collections::HashMap;
use std::sync::OnceLock;

/// Per-keyword behaviour flags, replacing a packed bitmask.
#[derive(Debug, Copy, Clone, Default)]
pub struct KeywordFlags {
    /// The keyword can follow certain tokens without being treated as
    /// starting a new statement (e.g. `ELSE`, `THEN`, `TO`).
    pub conditional: bool,
    /// This token leaves "start of statement" mode once emitted.
    pub ends_statement: bool,
    /// Recognising this keyword re-arms "start of statement" state for
    /// keyword-vs-variable disambiguation purposes.
    pub starts_statement: bool,
    /// `FN`/`PROC`: the following identifier characters are absorbed
    /// into the token rather than tokenised separately.
    pub proc_fn: bool,
    /// The bytes immediately following this token are a 3-byte encoded
    /// line number (`GOTO`, `GOSUB`, `THEN`, `ELSE`, `RESTORE`, ...).
    pub line_number_follows: bool,
    /// The rest of the physical line is copied verbatim, not tokenised
    /// (`REM`, `DATA`).
    pub verbatim_rest_of_line: bool,
    /// This token has a second, "pseudo-variable" form used when it
    /// appears as an assignment target (value is token + 0x40).
    pub pseudo_variable: bool,
}

const NONE: KeywordFlags = KeywordFlags {
    conditional: false,
    ends_statement: false,
    starts_statement: false,
    proc_fn: false,
    line_number_follows: false,
    verbatim_rest_of_line: false,
    pseudo_variable: false,
};

macro_rules! kwraw {
    ($token:expr, $name:literal) => {
        ($token, $name, NONE)
    };
    ($token:expr, $name:literal, $($flag:ident),+) => {
        ($token, $name, KeywordFlags { $($flag: true,)+ ..NONE })
    };
}

/// `(token, name, flags)` at the table's real `0x80..=0xFF` position.
/// Two slots (`0x8D`, `0xCE`) are blank in the original ROM table: they
/// are never matched as keyword text, because `0x8D` is reserved as the
/// tokenised-line-number introducer byte and `0xCE` is simply unused.
static KEYWORD_DEFS: &[(u8, &str, KeywordFlags)] = &[
    kwraw!(0x80, "AND"),
    kwraw!(0x81, "DIV"),
    kwraw!(0x82, "EOR"),
    kwraw!(0x83, "MOD"),
    kwraw!(0x84, "OR"),
    kwraw!(0x85, "ERROR", starts_statement),
    kwraw!(0x86, "LINE"),
    kwraw!(0x87, "OFF"),
    kwraw!(0x88, "STEP"),
    kwraw!(0x89, "SPC"),
    kwraw!(0x8a, "TAB("),
    kwraw!(0x8b, "ELSE", starts_statement, line_number_follows),
    kwraw!(0x8c, "THEN", starts_statement, line_number_follows),
    kwraw!(0x8d, ""),
    kwraw!(0x8e, "OPENIN"),
    kwraw!(0x8f, "PTR", conditional, ends_statement, pseudo_variable),
    kwraw!(0x90, "PAGE", conditional, ends_statement, pseudo_variable),
    kwraw!(0x91, "TIME", conditional, ends_statement, pseudo_variable),
    kwraw!(0x92, "LOMEM", conditional, ends_statement, pseudo_variable),
    kwraw!(0x93, "HIMEM", conditional, ends_statement, pseudo_variable),
    kwraw!(0x94, "ABS"),
    kwraw!(0x95, "ACS"),
    kwraw!(0x96, "ADVAL"),
    kwraw!(0x97, "ASC"),
    kwraw!(0x98, "ASN"),
    kwraw!(0x99, "ATN"),
    kwraw!(0x9a, "BGET", conditional),
    kwraw!(0x9b, "COS"),
    kwraw!(0x9c, "COUNT", conditional),
    kwraw!(0x9d, "DEG"),
    kwraw!(0x9e, "ERL", conditional),
    kwraw!(0x9f, "ERR", conditional),
    kwraw!(0xa0, "EVAL"),
    kwraw!(0xa1, "EXP"),
    kwraw!(0xa2, "EXT", conditional),
    kwraw!(0xa3, "FALSE", conditional),
    kwraw!(0xa4, "FN", proc_fn),
    kwraw!(0xa5, "GET"),
    kwraw!(0xa6, "INKEY"),
    kwraw!(0xa7, "INSTR("),
    kwraw!(0xa8, "INT"),
    kwraw!(0xa9, "LEN"),
    kwraw!(0xaa, "LN"),
    kwraw!(0xab, "LOG"),
    kwraw!(0xac, "NOT"),
    kwraw!(0xad, "OPENUP"),
    kwraw!(0xae, "OPENOUT"),
    kwraw!(0xaf, "PI", conditional),
    kwraw!(0xb0, "POINT("),
    kwraw!(0xb1, "POS", conditional),
    kwraw!(0xb2, "RAD"),
    kwraw!(0xb3, "RND", conditional),
    kwraw!(0xb4, "SGN"),
    kwraw!(0xb5, "SIN"),
    kwraw!(0xb6, "SQR"),
    kwraw!(0xb7, "TAN"),
    kwraw!(0xb8, "TO"),
    kwraw!(0xb9, "TRUE", conditional),
    kwraw!(0xba, "USR"),
    kwraw!(0xbb, "VAL"),
    kwraw!(0xbc, "VPOS", conditional),
    kwraw!(0xbd, "CHR$"),
    kwraw!(0xbe, "GET$"),
    kwraw!(0xbf, "INKEY$"),
    kwraw!(0xc0, "LEFT$("),
    kwraw!(0xc1, "MID$("),
    kwraw!(0xc2, "RIGHT$("),
    kwraw!(0xc3, "STR$"),
    kwraw!(0xc4, "STRING$("),
    kwraw!(0xc5, "EOF", conditional),
    kwraw!(0xc6, "AUTO", line_number_follows),
    kwraw!(0xc7, "DELETE", line_number_follows),
    kwraw!(0xc8, "LOAD", ends_statement),
    kwraw!(0xc9, "LIST", line_number_follows),
    kwraw!(0xca, "NEW", conditional),
    kwraw!(0xcb, "OLD", conditional),
    kwraw!(0xcc, "RENUMBER", line_number_follows),
    kwraw!(0xcd, "SAVE", ends_statement),
    kwraw!(0xce, ""),
    kwraw!(0xcf, "PTR"),
    kwraw!(0xd0, "PAGE"),
    kwraw!(0xd1, "TIME", conditional),
    kwraw!(0xd2, "LOMEM"),
    kwraw!(0xd3, "HIMEM"),
    kwraw!(0xd4, "SOUND", ends_statement),
    kwraw!(0xd5, "BPUT", conditional, ends_statement),
    kwraw!(0xd6, "CALL", ends_statement),
    kwraw!(0xd7, "CHAIN", ends_statement),
    kwraw!(0xd8, "CLEAR", conditional),
    kwraw!(0xd9, "CLOSE", conditional, ends_statement),
    kwraw!(0xda, "CLG", conditional),
    kwraw!(0xdb, "CLS", conditional),
    kwraw!(0xdc, "DATA", verbatim_rest_of_line),
    kwraw!(0xdd, "DEF"),
    kwraw!(0xde, "DIM", ends_statement),
    kwraw!(0xdf, "DRAW", ends_statement),
    kwraw!(0xe0, "END", conditional),
    kwraw!(0xe1, "ENDPROC", conditional),
    kwraw!(0xe2, "ENVELOPE", ends_statement),
    kwraw!(0xe3, "FOR", ends_statement),
    kwraw!(0xe4, "GOSUB", ends_statement, line_number_follows),
    kwraw!(0xe5, "GOTO", ends_statement, line_number_follows),
    kwraw!(0xe6, "GCOL", ends_statement),
    kwraw!(0xe7, "IF", ends_statement),
    kwraw!(0xe8, "INPUT", ends_statement),
    kwraw!(0xe9, "LET", starts_statement),
    kwraw!(0xea, "LOCAL", ends_statement),
    kwraw!(0xeb, "MODE", ends_statement),
    kwraw!(0xec, "MOVE", ends_statement),
    kwraw!(0xed, "NEXT", ends_statement),
    kwraw!(0xee, "ON", ends_statement),
    kwraw!(0xef, "VDU", ends_statement),
    kwraw!(0xf0, "PLOT", ends_statement),
    kwraw!(0xf1, "PRINT", ends_statement),
    kwraw!(0xf2, "PROC", ends_statement, proc_fn),
    kwraw!(0xf3, "READ", ends_statement),
    kwraw!(0xf4, "REM", verbatim_rest_of_line),
    kwraw!(0xf5, "REPEAT"),
    kwraw!(0xf6, "REPORT", conditional),
    kwraw!(0xf7, "RESTORE", ends_statement, line_number_follows),
    kwraw!(0xf8, "RETURN", conditional),
    kwraw!(0xf9, "RUN", conditional),
    kwraw!(0xfa, "STOP", conditional),
    kwraw!(0xfb, "COLOUR", ends_statement),
    kwraw!(0xfc, "TRACE", ends_statement, line_number_follows),
    kwraw!(0xfd, "UNTIL", ends_statement),
    kwraw!(0xfe, "WIDTH", ends_statement),
    kwraw!(0xff, "OSCLI", ends_statement),
];

pub struct Keyword {
    pub name: &'static str,
    pub token: u8,
    pub flags: KeywordFlags,
}

/// The full keyword table, blank reserved slots excluded.
pub fn keywords() -> &'static [Keyword] {
    static TABLE: OnceLock<Vec<Keyword>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            KEYWORD_DEFS
                .iter()
                .filter(|(_, name, _)| !name.is_empty())
                .map(|(token, name, flags)| Keyword { name, token: *token, flags: *flags })
                .collect()
        })
        .as_slice()
}

pub fn find_by_token(token: u8) -> Option<&'static Keyword> {
    keywords().iter().find(|k| k.token == token)
}

/// `(full_name, token, minimum_length)`: typing the first
/// `minimum_length` characters of `full_name` followed by a `.`
/// expands to the keyword byte `token` (independent of `full_name`'s
/// own position in [`KEYWORD_DEFS`], since e.g. `COLOR.` abbreviates
/// to `COLOUR`'s token and some keywords have two table slots).
pub struct Abbreviation {
    pub full_name: &'static str,
    pub token: u8,
    pub min_len: usize,
}

pub static ABBREVIATIONS: &[Abbreviation] = &[
    Abbreviation { full_name: "ABS", token: 0x94, min_len: 3 },
    Abbreviation { full_name: "ACS", token: 0x95, min_len: 3 },
    Abbreviation { full_name: "ADVAL", token: 0x96, min_len: 2 },
    Abbreviation { full_name: "AND", token: 0x80, min_len: 1 },
    Abbreviation { full_name: "ASC", token: 0x97, min_len: 3 },
    Abbreviation { full_name: "ASN", token: 0x98, min_len: 3 },
    Abbreviation { full_name: "ATN", token: 0x99, min_len: 3 },
    Abbreviation { full_name: "BGET", token: 0x9a, min_len: 1 },
    Abbreviation { full_name: "BPUT", token: 0xd5, min_len: 2 },
    Abbreviation { full_name: "CALL", token: 0xd6, min_len: 2 },
    Abbreviation { full_name: "CHAIN", token: 0xd7, min_len: 2 },
    Abbreviation { full_name: "CHR$", token: 0xbd, min_len: 3 },
    Abbreviation { full_name: "CLEAR", token: 0xd8, min_len: 2 },
    Abbreviation { full_name: "CLG", token: 0xda, min_len: 3 },
    Abbreviation { full_name: "CLOSE", token: 0xd9, min_len: 3 },
    Abbreviation { full_name: "CLS", token: 0xdb, min_len: 3 },
    Abbreviation { full_name: "COLOR", token: 0xfb, min_len: 1 },
    Abbreviation { full_name: "COLOUR", token: 0xfb, min_len: 1 },
    Abbreviation { full_name: "COS", token: 0x9b, min_len: 3 },
    Abbreviation { full_name: "COUNT", token: 0x9c, min_len: 3 },
    Abbreviation { full_name: "DATA", token: 0xdc, min_len: 1 },
    Abbreviation { full_name: "DEF", token: 0xdd, min_len: 3 },
    Abbreviation { full_name: "DEG", token: 0x9d, min_len: 3 },
    Abbreviation { full_name: "DIM", token: 0xde, min_len: 3 },
    Abbreviation { full_name: "DIV", token: 0x81, min_len: 3 },
    Abbreviation { full_name: "DRAW", token: 0xdf, min_len: 2 },
    Abbreviation { full_name: "ELSE", token: 0x8b, min_len: 2 },
    Abbreviation { full_name: "ENDPROC", token: 0xe1, min_len: 1 },
    Abbreviation { full_name: "END", token: 0xe0, min_len: 3 },
    Abbreviation { full_name: "ENVELOPE", token: 0xe2, min_len: 3 },
    Abbreviation { full_name: "EOF", token: 0xc5, min_len: 3 },
    Abbreviation { full_name: "EOR", token: 0x82, min_len: 3 },
    Abbreviation { full_name: "ERL", token: 0x9e, min_len: 3 },
    Abbreviation { full_name: "ERR", token: 0x9f, min_len: 3 },
    Abbreviation { full_name: "ERROR", token: 0x85, min_len: 3 },
    Abbreviation { full_name: "EVAL", token: 0xa0, min_len: 2 },
    Abbreviation { full_name: "EXP", token: 0xa1, min_len: 3 },
    Abbreviation { full_name: "EXT", token: 0xa2, min_len: 3 },
    Abbreviation { full_name: "FALSE", token: 0xa3, min_len: 2 },
    Abbreviation { full_name: "FN", token: 0xa4, min_len: 2 },
    Abbreviation { full_name: "FOR", token: 0xe3, min_len: 1 },
    Abbreviation { full_name: "GCOL", token: 0xe6, min_len: 2 },
    Abbreviation { full_name: "GET", token: 0xa5, min_len: 3 },
    Abbreviation { full_name: "GET$", token: 0xbe, min_len: 2 },
    Abbreviation { full_name: "GOSUB", token: 0xe4, min_len: 3 },
    Abbreviation { full_name: "GOTO", token: 0xe5, min_len: 1 },
    Abbreviation { full_name: "HIMEM", token: 0x93, min_len: 1 },
    Abbreviation { full_name: "HIMEM", token: 0xd3, min_len: 1 },
    Abbreviation { full_name: "IF", token: 0xe7, min_len: 2 },
    Abbreviation { full_name: "INKEY", token: 0xa6, min_len: 5 },
    Abbreviation { full_name: "INKEY$", token: 0xbf, min_len: 3 },
    Abbreviation { full_name: "INPUT", token: 0xe8, min_len: 1 },
    Abbreviation { full_name: "INSTR(", token: 0xa7, min_len: 3 },
    Abbreviation { full_name: "INT", token: 0xa8, min_len: 3 },
    Abbreviation { full_name: "LEFT$(", token: 0xc0, min_len: 2 },
    Abbreviation { full_name: "LEN", token: 0xa9, min_len: 3 },
    Abbreviation { full_name: "LET", token: 0xe9, min_len: 3 },
    Abbreviation { full_name: "LINE", token: 0x86, min_len: 4 },
    Abbreviation { full_name: "LN", token: 0xaa, min_len: 2 },
    Abbreviation { full_name: "LOCAL", token: 0xea, min_len: 3 },
    Abbreviation { full_name: "LOG", token: 0xab, min_len: 3 },
    Abbreviation { full_name: "LOMEM", token: 0x92, min_len: 3 },
    Abbreviation { full_name: "LOMEM", token: 0xd2, min_len: 3 },
    Abbreviation { full_name: "MID$(", token: 0xc1, min_len: 1 },
    Abbreviation { full_name: "MOD", token: 0x83, min_len: 3 },
    Abbreviation { full_name: "MODE", token: 0xeb, min_len: 2 },
    Abbreviation { full_name: "MOVE", token: 0xec, min_len: 3 },
    Abbreviation { full_name: "NEXT", token: 0xed, min_len: 1 },
    Abbreviation { full_name: "NOT", token: 0xac, min_len: 3 },
    Abbreviation { full_name: "OFF", token: 0x87, min_len: 3 },
    Abbreviation { full_name: "ON", token: 0xee, min_len: 2 },
    Abbreviation { full_name: "OPENIN", token: 0x8e, min_len: 2 },
    Abbreviation { full_name: "OPENOUT", token: 0xae, min_len: 5 },
    Abbreviation { full_name: "OPENUP", token: 0xad, min_len: 6 },
    Abbreviation { full_name: "OR", token: 0x84, min_len: 2 },
    Abbreviation { full_name: "OSCLI", token: 0xff, min_len: 3 },
    Abbreviation { full_name: "PAGE", token: 0x90, min_len: 2 },
    Abbreviation { full_name: "PAGE", token: 0xd0, min_len: 2 },
    Abbreviation { full_name: "PI", token: 0xaf, min_len: 2 },
    Abbreviation { full_name: "PLOT", token: 0xf0, min_len: 2 },
    Abbreviation { full_name: "POINT(", token: 0xb0, min_len: 2 },
    Abbreviation { full_name: "POS", token: 0xb1, min_len: 3 },
    Abbreviation { full_name: "PRINT", token: 0xf1, min_len: 1 },
    Abbreviation { full_name: "PROC", token: 0xf2, min_len: 3 },
    Abbreviation { full_name: "PTR", token: 0x8f, min_len: 2 },
    Abbreviation { full_name: "PTR", token: 0xcf, min_len: 2 },
    Abbreviation { full_name: "RAD", token: 0xb2, min_len: 3 },
    Abbreviation { full_name: "READ", token: 0xf3, min_len: 3 },
    Abbreviation { full_name: "REM", token: 0xf4, min_len: 3 },
    Abbreviation { full_name: "REPEAT", token: 0xf5, min_len: 3 },
    Abbreviation { full_name: "REPORT", token: 0xf6, min_len: 4 },
    Abbreviation { full_name: "RESTORE", token: 0xf7, min_len: 3 },
    Abbreviation { full_name: "RETURN", token: 0xf8, min_len: 1 },
    Abbreviation { full_name: "RIGHT$(", token: 0xc2, min_len: 2 },
    Abbreviation { full_name: "RND", token: 0xb3, min_len: 3 },
    Abbreviation { full_name: "RUN", token: 0xf9, min_len: 3 },
    Abbreviation { full_name: "SGN", token: 0xb4, min_len: 3 },
    Abbreviation { full_name: "SIN", token: 0xb5, min_len: 3 },
    Abbreviation { full_name: "SOUND", token: 0xd4, min_len: 2 },
    Abbreviation { full_name: "SPC", token: 0x89, min_len: 3 },
    Abbreviation { full_name: "SQR", token: 0xb6, min_len: 3 },
    Abbreviation { full_name: "STEP", token: 0x88, min_len: 1 },
    Abbreviation { full_name: "STOP", token: 0xfa, min_len: 3 },
    Abbreviation { full_name: "STR$", token: 0xc3, min_len: 3 },
    Abbreviation { full_name: "STRING$(", token: 0xc4, min_len: 4 },
    Abbreviation { full_name: "TAB(", token: 0x8a, min_len: 4 },
    Abbreviation { full_name: "TAN", token: 0xb7, min_len: 1 },
    Abbreviation { full_name: "THEN", token: 0x8c, min_len: 2 },
    Abbreviation { full_name: "TIME", token: 0x91, min_len: 2 },
    Abbreviation { full_name: "TIME", token: 0xd1, min_len: 2 },
    Abbreviation { full_name: "TO", token: 0xb8, min_len: 2 },
    Abbreviation { full_name: "TRACE", token: 0xfc, min_len: 2 },
    Abbreviation { full_name: "TRUE", token: 0xb9, min_len: 4 },
    Abbreviation { full_name: "UNTIL", token: 0xfd, min_len: 1 },
    Abbreviation { full_name: "USR", token: 0xba, min_len: 3 },
    Abbreviation { full_name: "VAL", token: 0xbb, min_len: 3 },
    Abbreviation { full_name: "VDU", token: 0xef, min_len: 1 },
    Abbreviation { full_name: "VPOS", token: 0xbc, min_len: 2 },
    Abbreviation { full_name: "WIDTH", token: 0xfe, min_len: 1 },
];

/// A quick lookup keyed on the first two (uppercased) bytes of the
/// keyword name, built once and shared -- the fast path the reference
/// tokeniser's disabled `QuickTable` was meant to provide but never
/// shipped (guarded out with `#if 0 // SFTODO`).
pub fn quick_table() -> &'static HashMap<(u8, u8), Vec<&'static Keyword>> {
    static TABLE: OnceLock<HashMap<(u8, u8), Vec<&'static Keyword>>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map: HashMap<(u8, u8), Vec<&'static Keyword>> = HashMap::new();
        for kw in keywords() {
            let bytes = kw.name.as_bytes();
            let a = bytes.first().copied().unwrap_or(0).to_ascii_uppercase();
            let b = bytes.get(1).copied().unwrap_or(0).to_ascii_uppercase();
            map.entry((a, b)).or_default().push(kw);
        }
        map
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_in_range() {
        let mut seen = std::collections::HashSet::new();
        for kw in keywords() {
            assert!(kw.token >= 0x80);
            assert!(seen.insert(kw.token), "duplicate token for {}", kw.name);
        }
    }

    #[test]
    fn find_by_token_roundtrips() {
        let goto = keywords().iter().find(|k| k.name == "GOTO").unwrap();
        assert_eq!(find_by_token(goto.token).unwrap().name, "GOTO");
    }

    #[test]
    fn print_and_goto_tokens_match_the_basic_rom() {
        assert_eq!(keywords().iter().find(|k| k.name == "PRINT").unwrap().token, 0xF1);
        assert_eq!(keywords().iter().find(|k| k.name == "GOTO").unwrap().token, 0xE5);
    }

    #[test]
    fn reserved_slots_are_not_matchable_keywords() {
        assert!(find_by_token(0x8D).is_none());
        assert!(find_by_token(0xCE).is_none());
    }

    #[test]
    fn goto_requires_line_number() {
        let goto = keywords().iter().find(|k| k.name == "GOTO").unwrap();
        assert!(goto.flags.line_number_follows);
    }

    #[test]
    fn rem_is_verbatim() {
        let rem = keywords().iter().find(|k| k.name == "REM").unwrap();
        assert!(rem.flags.verbatim_rest_of_line);
    }

    #[test]
    fn color_abbreviates_to_colour_token_without_its_own_keyword_slot() {
        let color = ABBREVIATIONS.iter().find(|a| a.full_name == "COLOR").unwrap();
        let colour = ABBREVIATIONS.iter().find(|a| a.full_name == "COLOUR").unwrap();
        assert_eq!(color.token, colour.token);
        assert!(!keywords().iter().any(|k| k.name == "COLOR"));
    }

    #[test]
    fn quick_table_groups_keywords_by_first_two_letters() {
        let table = quick_table();
        let group = table.get(&(b'P', b'R')).expect("PR.. group present");
        assert!(group.iter().any(|k| k.name == "PRINT"));
        assert!(group.iter().any(|k| k.name == "PROC"));
        assert!(!group.iter().any(|k| k.name == "GOTO"));
    }

    #[test]
    fn quick_table_is_built_once() {
        let a = quick_table() as *const _;
        let b = quick_table() as *const _;
        assert_eq!(a, b);
    }
}
