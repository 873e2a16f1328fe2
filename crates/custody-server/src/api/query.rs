//! Search query-string parsing.

use std::collections::HashMap;
use std::str::FromStr;

use custody_types::SearchFilter;

use super::error::ApiError;

/// All-lowercase spellings accepted alongside the camelCase names.
const ALIASES: [(&str, &str); 4] = [
    ("startDate", "startdate"),
    ("endDate", "enddate"),
    ("pageIndex", "pageindex"),
    ("pageSize", "pagesize"),
];

/// Build a filter from query parameters. Empty values count as absent.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] when a numeric or boolean parameter does
/// not parse.
pub(crate) fn parse_search_filter(params: &HashMap<String, String>) -> Result<SearchFilter, ApiError> {
    let text = |name: &str| lookup(params, name).map(ToString::to_string);

    Ok(SearchFilter {
        user_id: text("userId"),
        source_bc_name: text("sourceBcName"),
        source_app_name: text("sourceAppName"),
        action_type: text("actionType"),
        action_successful: lookup(params, "actionSuccessful")
            .map(|v| parse_bool("actionSuccessful", v))
            .transpose()?,
        start_date: parse_number(params, "startDate")?,
        end_date: parse_number(params, "endDate")?,
        page_index: parse_number(params, "pageIndex")?,
        page_size: parse_number(params, "pageSize")?,
    })
}

fn lookup<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    let alias = ALIASES
        .iter()
        .find(|(camel, _)| *camel == name)
        .map(|(_, lower)| *lower);

    params
        .get(name)
        .or_else(|| alias.and_then(|a| params.get(a)))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ApiError> {
    lookup(params, name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ApiError::BadRequest(format!("invalid {name}: '{raw}'")))
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ApiError> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ApiError::BadRequest(format!("invalid {name}: '{raw}'")))
    }
}
