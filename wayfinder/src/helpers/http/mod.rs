//! Helpers for hrefs, query strings and `application/x-www-form-urlencoded`
//! payloads.

use std::str::Utf8Error;

use percent_encoding::{percent_decode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// The characters left intact by form encoding, per the urlencoded media type.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// An ordered list of form fields, as produced by a submitted form.
///
/// Field order is preserved and duplicate names are allowed, matching the
/// shape of an urlencoded request body. This is the payload type carried by
/// submissions and delivered to actions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, String)>,
}

impl FormData {
    /// Creates an empty `FormData`.
    pub fn new() -> FormData {
        FormData {
            entries: Vec::new(),
        }
    }

    /// Appends a field. Existing fields with the same name are retained.
    pub fn append<K, V>(&mut self, name: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All fields, in submission order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Whether the form holds no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the fields as an `application/x-www-form-urlencoded` string.
    pub fn to_urlencoded(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{}={}", form_url_encode(n), form_url_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parses an urlencoded string back into ordered fields. Fields that are
    /// not valid UTF-8 after decoding are dropped.
    pub fn parse_urlencoded(raw: &str) -> FormData {
        let mut form = FormData::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = match pair.split_once('=') {
                Some((n, v)) => (n, v),
                None => (pair, ""),
            };
            if let (Ok(name), Ok(value)) = (form_url_decode(name), form_url_decode(value)) {
                form.append(name, value);
            }
        }
        form
    }
}

impl<K, V> std::iter::FromIterator<(K, V)> for FormData
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> FormData {
        let mut form = FormData::new();
        for (name, value) in iter {
            form.append(name, value);
        }
        form
    }
}

fn form_url_encode(raw: &str) -> String {
    utf8_percent_encode(raw, FORM_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Decode form-urlencoded strings (e.g. query string, or request body with
/// Content-Type: application/x-www-form-urlencoded).
fn form_url_decode(raw: &str) -> Result<String, Utf8Error> {
    percent_decode(raw.replace('+', " ").as_bytes())
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}

/// An href split into its pathname, search and hash components. The search
/// and hash are stored without their `?`/`#` delimiters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitHref {
    /// The path component, `/` when the href had none.
    pub pathname: String,
    /// The query string, without the leading `?`.
    pub search: String,
    /// The fragment, without the leading `#`.
    pub hash: String,
}

/// Splits an href of the form `/path?search#hash`.
pub fn split_href(href: &str) -> SplitHref {
    let (rest, hash) = match href.split_once('#') {
        Some((rest, hash)) => (rest, hash.to_string()),
        None => (href, String::new()),
    };
    let (pathname, search) = match rest.split_once('?') {
        Some((pathname, search)) => (pathname.to_string(), search.to_string()),
        None => (rest.to_string(), String::new()),
    };
    let pathname = if pathname.is_empty() {
        "/".to_string()
    } else {
        pathname
    };
    SplitHref {
        pathname,
        search,
        hash,
    }
}

/// Joins pathname, search and hash back into an href.
pub fn join_href(pathname: &str, search: &str, hash: &str) -> String {
    let mut href = String::from(pathname);
    if !search.is_empty() {
        href.push('?');
        href.push_str(search);
    }
    if !hash.is_empty() {
        href.push('#');
        href.push_str(hash);
    }
    href
}

/// Joins two path fragments with exactly one `/` between them.
pub fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{}/{}", base, path)
    }
}

/// Strips `basename` from the front of `pathname`. Returns `None` when the
/// pathname lives outside the basename.
pub fn strip_basename<'a>(pathname: &'a str, basename: &str) -> Option<&'a str> {
    if basename.is_empty() || basename == "/" {
        return Some(pathname);
    }
    let basename = basename.trim_end_matches('/');
    let stripped = pathname.strip_prefix(basename)?;
    if stripped.is_empty() {
        Some("/")
    } else if stripped.starts_with('/') {
        Some(stripped)
    } else {
        None
    }
}

/// Whether a search string carries a bare `index` parameter (value `""`),
/// the marker that targets a submission at an index route rather than its
/// layout parent.
pub fn has_bare_index_param(search: &str) -> bool {
    search
        .split('&')
        .filter(|p| !p.is_empty())
        .any(|pair| pair == "index" || pair == "index=")
}
