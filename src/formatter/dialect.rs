//! Athena (Trino) vocabulary used by the fixer and the standardiser.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

const ATHENA_FUNCTIONS: &[&str] = &[
    // aggregate
    "approx_distinct", "approx_percentile", "arbitrary", "array_agg", "avg", "bool_and",
    "bool_or", "checksum", "count", "count_if", "every", "geometric_mean", "histogram",
    "map_agg", "max", "max_by", "min", "min_by", "stddev", "stddev_pop", "stddev_samp",
    "sum", "variance", "var_pop", "var_samp", "listagg",
    // window
    "cume_dist", "dense_rank", "first_value", "lag", "last_value", "lead", "nth_value",
    "ntile", "percent_rank", "rank", "row_number",
    // conditional
    "coalesce", "if", "nullif", "try", "try_cast", "cast", "greatest", "least",
    // math
    "abs", "cbrt", "ceil", "ceiling", "degrees", "e", "exp", "floor", "ln", "log", "log10",
    "log2", "mod", "pi", "pow", "power", "radians", "rand", "random", "round", "sign",
    "sqrt", "truncate", "width_bucket", "is_nan", "is_finite", "is_infinite", "nan",
    "infinity",
    // string
    "chr", "codepoint", "concat", "concat_ws", "format", "length", "levenshtein_distance",
    "lower", "lpad", "ltrim", "position", "replace", "reverse", "rpad", "rtrim", "split",
    "split_part", "strpos", "substr", "substring", "trim", "upper", "regexp_extract",
    "regexp_extract_all", "regexp_like", "regexp_replace", "regexp_split", "starts_with",
    "to_utf8", "from_utf8", "url_extract_host", "url_extract_parameter", "json_extract",
    "json_extract_scalar", "json_format", "json_parse", "json_size", "md5", "sha256",
    "to_hex", "from_hex",
    // date and time
    "current_timezone", "date", "date_add", "date_diff", "date_format", "date_parse",
    "date_trunc", "day", "day_of_month", "day_of_week", "day_of_year", "dow", "doy",
    "extract", "format_datetime", "from_iso8601_date", "from_iso8601_timestamp",
    "from_unixtime", "hour", "last_day_of_month", "millisecond", "minute", "month", "now",
    "parse_datetime", "quarter", "second", "to_iso8601", "to_unixtime", "week",
    "week_of_year", "year", "year_of_week", "yow", "at_timezone", "with_timezone",
    // arrays and maps
    "array_distinct", "array_join", "array_max", "array_min", "array_position",
    "array_sort", "cardinality", "contains", "element_at", "filter", "flatten", "map",
    "map_keys", "map_values", "sequence", "slice", "transform", "unnest", "zip",
    // misc
    "typeof", "uuid",
];

const FUNCTION_CONVERSIONS: &[(&str, &str)] = &[
    ("IFNULL", "COALESCE"),
    ("NVL", "COALESCE"),
    ("ISNULL", "COALESCE"),
    ("DATEDIFF", "DATE_DIFF"),
    ("TIMESTAMPDIFF", "DATE_DIFF"),
    ("DATEADD", "DATE_ADD"),
    ("TIMESTAMPADD", "DATE_ADD"),
    ("LEN", "LENGTH"),
    ("CHAR_LENGTH", "LENGTH"),
    ("CHARACTER_LENGTH", "LENGTH"),
    ("UCASE", "UPPER"),
    ("LCASE", "LOWER"),
    ("STRFTIME", "DATE_FORMAT"),
    ("TO_CHAR", "DATE_FORMAT"),
    ("STR_TO_DATE", "DATE_PARSE"),
    ("GETDATE", "NOW"),
    ("SYSDATE", "NOW"),
    ("STDEV", "STDDEV"),
    ("GROUP_CONCAT", "ARRAY_AGG"),
    ("STRING_AGG", "LISTAGG"),
    ("INSTR", "STRPOS"),
];

const DATATYPES: &[&str] = &[
    "BOOLEAN", "TINYINT", "SMALLINT", "INT", "INTEGER", "BIGINT", "REAL", "DOUBLE",
    "DECIMAL", "VARCHAR", "CHAR", "VARBINARY", "JSON", "DATE", "TIME", "TIMESTAMP",
    "INTERVAL", "ARRAY", "MAP", "ROW", "IPADDRESS", "UUID",
];

const DATATYPE_CONVERSIONS: &[(&str, &str)] = &[
    ("STRING", "VARCHAR"),
    ("TEXT", "VARCHAR"),
    ("STR", "VARCHAR"),
    ("INT64", "BIGINT"),
    ("LONG", "BIGINT"),
    ("FLOAT64", "DOUBLE"),
    ("FLOAT", "DOUBLE"),
    ("NUMBER", "DOUBLE"),
    ("NUMERIC", "DECIMAL"),
    ("DATETIME", "TIMESTAMP"),
    ("BOOL", "BOOLEAN"),
];

/// Keywords that behave like values and must not be called with `()`.
pub const DATETIME_LITERALS: &[&str] = &[
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "LOCALTIME",
    "LOCALTIMESTAMP",
];

/// Structural keywords: uppercased by the standardiser and never treated as
/// aliases or function names by the fixer.
const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "AS", "ON", "JOIN", "INNER", "LEFT",
    "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "GROUP", "BY", "ORDER", "HAVING", "LIMIT",
    "OFFSET", "WITH", "UNION", "ALL", "DISTINCT", "CASE", "WHEN", "THEN", "ELSE", "END",
    "IN", "IS", "NULL", "BETWEEN", "LIKE", "ASC", "DESC", "OVER", "PARTITION", "INTERVAL",
    "CAST", "EXCEPT", "INTERSECT", "SHOW", "CREATE", "TABLE", "EXISTS", "USING", "TRUE",
    "FALSE", "NULLS", "UNBOUNDED", "PRECEDING", "FOLLOWING", "FETCH", "VALUES", "DESCRIBE",
    "ESCAPE", "WINDOW", "LATERAL", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP",
    "LOCALTIME", "LOCALTIMESTAMP",
];

lazy_static! {
    static ref FUNCTION_SET: HashSet<&'static str> = ATHENA_FUNCTIONS.iter().copied().collect();
    static ref FUNCTION_CONVERSION_MAP: HashMap<&'static str, &'static str> =
        FUNCTION_CONVERSIONS.iter().copied().collect();
    static ref DATATYPE_SET: HashSet<&'static str> = DATATYPES.iter().copied().collect();
    static ref DATATYPE_CONVERSION_MAP: HashMap<&'static str, &'static str> =
        DATATYPE_CONVERSIONS.iter().copied().collect();
    static ref KEYWORD_SET: HashSet<&'static str> = KEYWORDS.iter().copied().collect();
}

pub fn is_allowed_function(name: &str) -> bool {
    FUNCTION_SET.contains(name.to_lowercase().as_str())
}

pub fn function_conversion(name: &str) -> Option<&'static str> {
    FUNCTION_CONVERSION_MAP.get(name.to_uppercase().as_str()).copied()
}

pub fn is_datatype(name: &str) -> bool {
    let upper = name.to_uppercase();
    DATATYPE_SET.contains(upper.as_str()) || DATATYPE_CONVERSION_MAP.contains_key(upper.as_str())
}

pub fn datatype_conversion(name: &str) -> Option<&'static str> {
    DATATYPE_CONVERSION_MAP.get(name.to_uppercase().as_str()).copied()
}

pub fn is_keyword(word: &str) -> bool {
    KEYWORD_SET.contains(word.to_uppercase().as_str())
}

/// Closest allowed function by normalized edit distance, if similar enough.
pub fn closest_function(name: &str, cutoff: f64) -> Option<&'static str> {
    let lower = name.to_lowercase();
    ATHENA_FUNCTIONS
        .iter()
        .map(|candidate| (*candidate, strsim::normalized_levenshtein(&lower, candidate)))
        .filter(|(_, score)| *score >= cutoff)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}
