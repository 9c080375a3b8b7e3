//! # Keyword Registry
//!
//! Single source of truth for the wire vocabulary of the JSON request and
//! response records. Every logical field and every enumerated value carries a
//! (terse, verbose) token pair; clients may speak either dialect and the
//! registry translates in both directions.
//!
//! | Field | Terse | Verbose |
//! |-------|-------|---------|
//! | unit id | `id` | `identifier` |
//! | operation | `fn` | `function` |
//! | datatype | `dt` | `datatype` |
//! | range | `rg` | `range` |
//! | list | `ls` | `list` |
//! | values | `dv` | `values` |
//! | subfunction | `sf` | `subfunction` |
//! | packet | `pk` | `packet` |
//! | status | `st` | `status` |
//! | message | `msg` | `message` |
//! | fetched data | `fd` | `fetched-data` |
//! | allowed values | `av` | `allowed-values` |
//!
//! No other component may hard-code wire names.

/// Record dialect spoken by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Short keys and tokens (`id`, `fn`, `r`, `bi`, ...)
    Terse,
    /// Long keys and tokens (`identifier`, `function`, `read`, `boolean-input`, ...)
    Verbose,
}

/// The logical fields of a request/response record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UnitId,
    Operation,
    Datatype,
    Range,
    List,
    Values,
    Subfunction,
    Packet,
    Status,
    Message,
    FetchedData,
    AllowedValues,
}

/// A (terse, verbose) token pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPair {
    pub terse: &'static str,
    pub verbose: &'static str,
}

impl TokenPair {
    /// Token in the requested format
    #[inline]
    pub fn in_format(&self, format: Format) -> &'static str {
        match format {
            Format::Terse => self.terse,
            Format::Verbose => self.verbose,
        }
    }

    /// True if `token` is either form of this pair
    #[inline]
    pub fn matches(&self, token: &str) -> bool {
        token == self.terse || token == self.verbose
    }
}

/// The eight request fields, in canonical iteration order
pub const REQUEST_FIELDS: [Field; 8] = [
    Field::UnitId,
    Field::Operation,
    Field::Datatype,
    Field::Range,
    Field::List,
    Field::Values,
    Field::Subfunction,
    Field::Packet,
];

static FIELD_NAMES: [(Field, TokenPair); 12] = [
    (Field::UnitId, TokenPair { terse: "id", verbose: "identifier" }),
    (Field::Operation, TokenPair { terse: "fn", verbose: "function" }),
    (Field::Datatype, TokenPair { terse: "dt", verbose: "datatype" }),
    (Field::Range, TokenPair { terse: "rg", verbose: "range" }),
    (Field::List, TokenPair { terse: "ls", verbose: "list" }),
    (Field::Values, TokenPair { terse: "dv", verbose: "values" }),
    (Field::Subfunction, TokenPair { terse: "sf", verbose: "subfunction" }),
    (Field::Packet, TokenPair { terse: "pk", verbose: "packet" }),
    (Field::Status, TokenPair { terse: "st", verbose: "status" }),
    (Field::Message, TokenPair { terse: "msg", verbose: "message" }),
    (Field::FetchedData, TokenPair { terse: "fd", verbose: "fetched-data" }),
    (Field::AllowedValues, TokenPair { terse: "av", verbose: "allowed-values" }),
];

/// Operation value tokens: read / write / diagnosis / raw modbus
pub static OPERATION_TOKENS: [TokenPair; 4] = [
    TokenPair { terse: "r", verbose: "read" },
    TokenPair { terse: "u", verbose: "write" },
    TokenPair { terse: "d", verbose: "diagnosis" },
    TokenPair { terse: "m", verbose: "modbus" },
];

/// Datatype value tokens: coil/discrete/holding/input address spaces
pub static DATATYPE_TOKENS: [TokenPair; 4] = [
    TokenPair { terse: "bi", verbose: "boolean-input" },
    TokenPair { terse: "bo", verbose: "boolean-output" },
    TokenPair { terse: "ni", verbose: "numeric-input" },
    TokenPair { terse: "no", verbose: "numeric-output" },
];

/// One entry of the diagnostic subfunction registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subfunction {
    pub tokens: TokenPair,
    /// 16-bit subfunction code carried in the ADU address field
    pub code: u16,
    /// Whether the reply carries a 16-bit datum to surface as fetched data
    pub fetches_data: bool,
}

/// Diagnostic (FC08) subfunction registry, mirroring the standard MODBUS
/// serial-line diagnostics table.
pub static SUBFUNCTIONS: [Subfunction; 15] = [
    Subfunction { tokens: TokenPair { terse: "rqdt", verbose: "return-query-data" }, code: 0x0000, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rsco", verbose: "restart-communications" }, code: 0x0001, fetches_data: false },
    Subfunction { tokens: TokenPair { terse: "rdgr", verbose: "return-diagnostic-register" }, code: 0x0002, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "chad", verbose: "change-ascii-delimiter" }, code: 0x0003, fetches_data: false },
    Subfunction { tokens: TokenPair { terse: "folo", verbose: "force-listen-only" }, code: 0x0004, fetches_data: false },
    Subfunction { tokens: TokenPair { terse: "clct", verbose: "clear-counters" }, code: 0x000A, fetches_data: false },
    Subfunction { tokens: TokenPair { terse: "rbmc", verbose: "return-bus-message-count" }, code: 0x000B, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rbec", verbose: "return-bus-error-count" }, code: 0x000C, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rbxc", verbose: "return-bus-exception-count" }, code: 0x000D, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rsmc", verbose: "return-server-message-count" }, code: 0x000E, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rsnr", verbose: "return-server-no-response-count" }, code: 0x000F, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rsnk", verbose: "return-server-nak-count" }, code: 0x0010, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rsbc", verbose: "return-server-busy-count" }, code: 0x0011, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "rboc", verbose: "return-bus-overrun-count" }, code: 0x0012, fetches_data: true },
    Subfunction { tokens: TokenPair { terse: "clov", verbose: "clear-overrun-counter" }, code: 0x0014, fetches_data: false },
];

/// Key name of a field in the given format
pub fn field_name(field: Field, format: Format) -> &'static str {
    FIELD_NAMES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, pair)| pair.in_format(format))
        .unwrap_or("")
}

/// Resolve a key name (either dialect) to its logical field
pub fn field_for_name(name: &str) -> Option<Field> {
    FIELD_NAMES
        .iter()
        .find(|(_, pair)| pair.matches(name))
        .map(|(f, _)| *f)
}

/// Canonicalise a value token (either dialect) to its terse form.
///
/// Unknown tokens return `None`; the formatter passes them through unchanged
/// and relies on the validator to have accepted the record.
pub fn canonical_value(token: &str) -> Option<&'static str> {
    value_pairs()
        .find(|pair| pair.matches(token))
        .map(|pair| pair.terse)
}

/// Project a terse value token into the requested format
pub fn project_value(terse: &str, format: Format) -> Option<&'static str> {
    value_pairs()
        .find(|pair| pair.terse == terse)
        .map(|pair| pair.in_format(format))
}

/// Look up a subfunction by token in either dialect
pub fn subfunction(token: &str) -> Option<&'static Subfunction> {
    SUBFUNCTIONS.iter().find(|sf| sf.tokens.matches(token))
}

/// Look up a subfunction by its wire code
pub fn subfunction_by_code(code: u16) -> Option<&'static Subfunction> {
    SUBFUNCTIONS.iter().find(|sf| sf.code == code)
}

/// All operation tokens in the given format (for allowed-values reporting)
pub fn operation_tokens(format: Format) -> Vec<&'static str> {
    OPERATION_TOKENS.iter().map(|p| p.in_format(format)).collect()
}

/// All datatype tokens in the given format
pub fn datatype_tokens(format: Format) -> Vec<&'static str> {
    DATATYPE_TOKENS.iter().map(|p| p.in_format(format)).collect()
}

/// All subfunction tokens in the given format
pub fn subfunction_tokens(format: Format) -> Vec<&'static str> {
    SUBFUNCTIONS
        .iter()
        .map(|sf| sf.tokens.in_format(format))
        .collect()
}

fn value_pairs() -> impl Iterator<Item = &'static TokenPair> {
    OPERATION_TOKENS
        .iter()
        .chain(DATATYPE_TOKENS.iter())
        .chain(SUBFUNCTIONS.iter().map(|sf| &sf.tokens))
}
