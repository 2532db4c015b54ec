//! Sheet URL resolution
//!
//! Turns whatever link the user pasted into a human-facing edit URL and a
//! machine-facing fetch URL. Pure and total: input that cannot be
//! understood comes back unchanged as both URLs.
//!
//! Fetch URL priority once a spreadsheet id is found:
//! 1. `/export?format=csv` links are kept (range applied)
//! 2. `/gviz/tq` links are kept (`tqx=out:csv` forced, range applied,
//!    sheet name added if absent)
//! 3. id + gid builds a direct CSV export
//! 4. id alone falls back to gviz by sheet name, else `gid=0`

use google_auth::DOCS_BASE;
use tracing::debug;
use url::Url;

/// Spreadsheet coordinates extracted from a sheet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReference {
    pub spreadsheet_id: String,
    pub gid: Option<String>,
    pub sheet_name: Option<String>,
    pub range: Option<String>,
}

/// Result of resolving a sheet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTargets {
    /// Link for a human to open the sheet
    pub edit_url: String,
    /// Unauthenticated CSV URL
    pub fetch_url: String,
    /// Present when a spreadsheet id was found
    pub reference: Option<SheetReference>,
}

/// Resolve a sheet link against the public Google docs host.
pub fn resolve_targets(
    sheet_url: &str,
    range: Option<&str>,
    sheet_name: Option<&str>,
    explicit_gid: Option<&str>,
) -> SheetTargets {
    resolve_targets_with_base(DOCS_BASE, sheet_url, range, sheet_name, explicit_gid)
}

/// Resolve a sheet link, building canonical URLs under `docs_base`.
///
/// Empty strings are treated the same as absent values.
pub fn resolve_targets_with_base(
    docs_base: &str,
    sheet_url: &str,
    range: Option<&str>,
    sheet_name: Option<&str>,
    explicit_gid: Option<&str>,
) -> SheetTargets {
    let range = non_empty(range);
    let sheet_name = non_empty(sheet_name);

    let Ok(mut url) = Url::parse(sheet_url) else {
        debug!("sheet URL did not parse, using it verbatim");
        return identity(sheet_url);
    };

    let id = spreadsheet_id(url.path());
    let gid = non_empty(explicit_gid)
        .map(str::to_string)
        .or_else(|| url.fragment().and_then(gid_from_fragment))
        .or_else(|| query_value(&url, "gid").filter(|g| !g.is_empty()));

    let docs_base = docs_base.trim_end_matches('/');
    let edit_url = match &id {
        Some(id) => match &gid {
            Some(gid) => format!("{docs_base}/spreadsheets/d/{id}/edit#gid={gid}"),
            None => format!("{docs_base}/spreadsheets/d/{id}/edit"),
        },
        None => sheet_url.to_string(),
    };
    // Explicit values win; a pasted gviz/export link may carry its own.
    let reference = id.as_ref().map(|id| SheetReference {
        spreadsheet_id: id.clone(),
        gid: gid.clone(),
        sheet_name: sheet_name
            .map(str::to_string)
            .or_else(|| query_value(&url, "sheet").filter(|s| !s.is_empty())),
        range: range
            .map(str::to_string)
            .or_else(|| query_value(&url, "range").filter(|r| !r.is_empty())),
    });

    if url.path().contains("/export") && query_value(&url, "format").as_deref() == Some("csv") {
        if let Some(range) = range {
            set_query_param(&mut url, "range", range);
        }
        return SheetTargets {
            edit_url,
            fetch_url: url.into(),
            reference,
        };
    }

    if url.path().contains("/gviz/tq") {
        set_query_param(&mut url, "tqx", "out:csv");
        if let Some(range) = range {
            set_query_param(&mut url, "range", range);
        }
        if let Some(name) = sheet_name {
            if query_value(&url, "sheet").is_none_or(|s| s.is_empty()) {
                set_query_param(&mut url, "sheet", name);
            }
        }
        return SheetTargets {
            edit_url,
            fetch_url: url.into(),
            reference,
        };
    }

    let Some(id) = id else {
        return identity(sheet_url);
    };

    if let Some(gid) = &gid {
        let base = format!("{docs_base}/spreadsheets/d/{id}/export?format=csv&gid={gid}");
        let fetch_url = match range {
            Some(range) => format!("{base}&range={}", urlencoding::encode(range)),
            None => base,
        };
        return SheetTargets {
            edit_url,
            fetch_url,
            reference,
        };
    }

    let Ok(mut gviz) = Url::parse(&format!("{docs_base}/spreadsheets/d/{id}/gviz/tq")) else {
        return identity(sheet_url);
    };
    set_query_param(&mut gviz, "tqx", "out:csv");
    if let Some(range) = range {
        set_query_param(&mut gviz, "range", range);
    }
    match sheet_name {
        Some(name) => set_query_param(&mut gviz, "sheet", name),
        None => set_query_param(&mut gviz, "gid", "0"),
    }
    SheetTargets {
        edit_url,
        fetch_url: gviz.into(),
        reference,
    }
}

fn identity(sheet_url: &str) -> SheetTargets {
    SheetTargets {
        edit_url: sheet_url.to_string(),
        fetch_url: sheet_url.to_string(),
        reference: None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Segment following `/spreadsheets/d/` in a URL path.
fn spreadsheet_id(path: &str) -> Option<String> {
    const MARKER: &str = "/spreadsheets/d/";
    let start = path.find(MARKER)? + MARKER.len();
    let id = path[start..].split('/').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Digits after a `gid=` that starts the fragment or follows `?` or `&`.
fn gid_from_fragment(fragment: &str) -> Option<String> {
    let hash = format!("#{fragment}");
    let mut search_from = 0;
    while let Some(found) = hash[search_from..].find("gid=") {
        let at = search_from + found;
        let preceded = at > 0 && matches!(hash.as_bytes()[at - 1], b'#' | b'?' | b'&');
        let digits: String = hash[at + 4..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if preceded && !digits.is_empty() {
            return Some(digits);
        }
        search_from = at + 4;
    }
    None
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Set `key` to `value`, replacing the first occurrence in place and
/// dropping any later duplicates, or appending when absent.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter_map(|(k, v)| {
            if k != key {
                Some((k, v))
            } else if replaced {
                None
            } else {
                replaced = true;
                Some((k, value.to_string()))
            }
        })
        .collect();

    let mut query = url.query_pairs_mut();
    query.clear().extend_pairs(pairs);
    if !replaced {
        query.append_pair(key, value);
    }
}
