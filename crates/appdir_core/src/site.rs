use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{AppRecord, Catalog, DEFAULT_VERSION};
use crate::config::DirectoryConfig;
use crate::error::SiteWarning;
use crate::filesystem::write_if_changed;

pub const DATA_SCRIPT_ID: &str = "apps-data";
pub const DATA_MARKER: &str = "APPS_DATA";
pub const DATA_GLOBAL: &str = "window.APPS_DATA";

const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteOptions {
    pub placeholder_icon: String,
    pub featured_class: String,
}

impl SiteOptions {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            placeholder_icon: config.placeholder_icon().to_string(),
            featured_class: config.featured_container_class().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRender {
    pub html: String,
    pub data_embedded: bool,
    pub featured_rendered: Option<usize>,
    pub warnings: Vec<SiteWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub path: PathBuf,
    pub data_embedded: bool,
    pub featured_rendered: Option<usize>,
    pub changed: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Apply both document rewrites to the HTML file at `path`.
///
/// Problems with the document itself (missing, unreadable, unwritable) are
/// reported as warnings, never as errors.
pub fn update_site_document(
    path: &Path,
    catalog: &Catalog,
    options: &SiteOptions,
    dry_run: bool,
) -> Result<SiteReport> {
    if !path.exists() {
        return Ok(skipped_document(
            path,
            SiteWarning::DocumentMissing {
                path: path.to_path_buf(),
            },
        ));
    }

    let html = match fs::read(path)
        .map_err(anyhow::Error::new)
        .and_then(|bytes| String::from_utf8(bytes).map_err(anyhow::Error::new))
    {
        Ok(html) => html,
        Err(error) => {
            return Ok(skipped_document(
                path,
                SiteWarning::DocumentUnreadable {
                    path: path.to_path_buf(),
                    detail: format!("{error:#}"),
                },
            ));
        }
    };

    let render = inject_site(&html, catalog, options)?;
    for warning in &render.warnings {
        warn!("{warning}");
    }
    let mut warnings: Vec<String> = render.warnings.iter().map(ToString::to_string).collect();

    let (changed, diff) = match write_if_changed(path, &render.html, dry_run) {
        Ok(outcome) => (outcome.changed, outcome.diff),
        Err(error) => {
            let warning = SiteWarning::DocumentUnwritable {
                path: path.to_path_buf(),
                detail: format!("{error:#}"),
            };
            warn!("{warning}");
            warnings.push(warning.to_string());
            (false, None)
        }
    };
    info!(
        path = %path.display(),
        changed,
        featured = render.featured_rendered.unwrap_or(0),
        "site document processed"
    );

    Ok(SiteReport {
        path: path.to_path_buf(),
        data_embedded: render.data_embedded,
        featured_rendered: render.featured_rendered,
        changed,
        warnings,
        diff,
    })
}

fn skipped_document(path: &Path, warning: SiteWarning) -> SiteReport {
    warn!("{warning}");
    SiteReport {
        path: path.to_path_buf(),
        data_embedded: false,
        featured_rendered: None,
        changed: false,
        warnings: vec![warning.to_string()],
        diff: None,
    }
}

/// Run data embedding and featured regeneration over an in-memory document.
pub fn inject_site(html: &str, catalog: &Catalog, options: &SiteOptions) -> Result<SiteRender> {
    let mut warnings = Vec::new();

    let (html, data_embedded) = match embed_catalog_data(html, catalog, &options.featured_class)? {
        Some(updated) => (updated, true),
        None => {
            warnings.push(SiteWarning::DataAnchorMissing);
            (html.to_string(), false)
        }
    };

    let (html, featured_rendered) = match regenerate_featured(&html, catalog, options) {
        Ok(updated) => (updated, Some(catalog.featured().count())),
        Err(warning) => {
            warnings.push(warning);
            (html, None)
        }
    };

    Ok(SiteRender {
        html,
        data_embedded,
        featured_rendered,
        warnings,
    })
}

/// Replace the embedded data script, or the `<!-- APPS_DATA -->` marker when
/// no script exists yet. Returns `None` when neither anchor is present.
///
/// Anchors inside the featured container are ignored: that content is owned
/// by the featured rendering and gets replaced wholesale.
pub fn embed_catalog_data(
    html: &str,
    catalog: &Catalog,
    featured_class: &str,
) -> Result<Option<String>> {
    let script = render_data_script(catalog)?;

    let featured = match find_element(html, |tag| has_class(tag.source, featured_class)) {
        ElementLookup::Found(span) => Some(span.inner_start..span.inner_end),
        ElementLookup::Missing | ElementLookup::Unterminated => None,
    };
    let usable = |tag: &Tag<'_>| {
        featured
            .as_ref()
            .is_none_or(|inner| !inner.contains(&tag.start))
    };

    let existing = find_element(html, |tag| {
        tag.name == "script" && attribute(tag.source, "id") == Some(DATA_SCRIPT_ID) && usable(tag)
    });
    let range = match existing {
        ElementLookup::Found(span) => Some((span.start, span.end)),
        ElementLookup::Missing | ElementLookup::Unterminated => TagScanner::new(html)
            .find(|tag| {
                tag.kind == TagKind::Comment
                    && comment_body(tag.source) == DATA_MARKER
                    && usable(tag)
            })
            .map(|tag| (tag.start, tag.end)),
    };

    Ok(range.map(|(start, end)| splice(html, start, end, &script)))
}

/// The embedded payload never contains `<`, `>` or `&`, so no catalog text can
/// end the script element or open a comment inside it.
pub fn render_data_script(catalog: &Catalog) -> Result<String> {
    let json =
        serde_json::to_string(catalog).context("failed to serialize catalog for embedding")?;
    Ok(format!(
        "<script id=\"{DATA_SCRIPT_ID}\">{DATA_GLOBAL} = {};</script>",
        escape_script_json(&json)
    ))
}

fn escape_script_json(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Replace the inner content of the featured container with freshly rendered
/// cards for every featured app, in catalog order.
pub fn regenerate_featured(
    html: &str,
    catalog: &Catalog,
    options: &SiteOptions,
) -> Result<String, SiteWarning> {
    let class = options.featured_class.as_str();
    let span = match find_element(html, |tag| has_class(tag.source, class)) {
        ElementLookup::Found(span) => span,
        ElementLookup::Missing => {
            return Err(SiteWarning::FeaturedContainerMissing {
                class: class.to_string(),
            });
        }
        ElementLookup::Unterminated => {
            return Err(SiteWarning::FeaturedContainerUnterminated {
                class: class.to_string(),
            });
        }
    };

    let indent = line_indent(html, span.start);
    let fragment = render_featured_fragment(catalog, options, indent);
    Ok(splice(html, span.inner_start, span.inner_end, &fragment))
}

pub fn render_featured_fragment(catalog: &Catalog, options: &SiteOptions, indent: &str) -> String {
    let card_indent = format!("{indent}  ");
    let mut fragment = String::new();
    for app in catalog.featured() {
        for line in render_card(app, &options.placeholder_icon).lines() {
            fragment.push('\n');
            fragment.push_str(&card_indent);
            fragment.push_str(line);
        }
    }
    fragment.push('\n');
    fragment.push_str(indent);
    fragment
}

/// Card markup for a single app. Every interpolated value is escaped.
pub fn render_card(app: &AppRecord, placeholder_icon: &str) -> String {
    let id = escape_html(&app.id);
    let name = escape_html(&app.name);
    let mut lines = vec![
        format!("<article class=\"app-card app-card--featured\" data-app-id=\"{id}\">"),
        "  <div class=\"app-card__header\">".to_string(),
        format!(
            "    <img class=\"app-card__icon\" src=\"{}\" alt=\"{name}\" loading=\"lazy\" onerror=\"this.src='{}'\">",
            escape_html(&app.icon),
            escape_html(placeholder_icon)
        ),
        format!(
            "    <span class=\"badge\">{}</span>",
            escape_html(&app.category)
        ),
        "  </div>".to_string(),
        "  <div class=\"app-card__content\">".to_string(),
        "    <div class=\"app-card__details\">".to_string(),
        "      <div class=\"app-card__meta\">".to_string(),
        format!("        <h3 class=\"app-card__title\">{name}</h3>"),
        format!(
            "        <p class=\"app-card__publisher\">{}</p>",
            escape_html(&app.publisher)
        ),
        "      </div>".to_string(),
        format!(
            "      <p class=\"app-card__description\">{}</p>",
            escape_html(&app.description)
        ),
    ];

    if !app.version.is_empty() && app.version != DEFAULT_VERSION {
        lines.push(format!(
            "      <span class=\"app-card__version\">v{}</span>",
            escape_html(&app.version)
        ));
    }

    let capabilities = [
        (app.single_user, "single-user", "Single user"),
        (app.multi_user, "multi-user", "Multi user"),
    ]
    .into_iter()
    .filter(|(flag, _, _)| *flag == Some(true))
    .collect::<Vec<_>>();
    if !capabilities.is_empty() {
        lines.push("      <div class=\"app-card__capabilities\">".to_string());
        for (_, modifier, label) in capabilities {
            lines.push(format!(
                "        <span class=\"app-card__capability app-card__capability--{modifier}\" title=\"{label}\">{label}</span>"
            ));
        }
        lines.push("      </div>".to_string());
    }

    lines.push("    </div>".to_string());
    lines.push("  </div>".to_string());
    lines.push("  <div class=\"app-card__footer\">".to_string());
    let action = if app.spixi_url.is_empty() {
        "#".to_string()
    } else {
        escape_html(&app.spixi_url)
    };
    lines.push(format!(
        "    <a href=\"{action}\" class=\"btn btn-sm btn-outlined\"><span class=\"btn__label\">Try in Spixi</span></a>"
    ));
    if let Some(website) = app.website.as_deref().filter(|value| !value.is_empty()) {
        lines.push(format!(
            "    <a href=\"{}\" class=\"app-card__website\" target=\"_blank\" rel=\"noopener noreferrer\" aria-label=\"Visit website\">Website</a>",
            escape_html(website)
        ));
    }
    if !app.github.is_empty() {
        lines.push(format!(
            "    <a href=\"{}\" class=\"app-card__github\" target=\"_blank\" rel=\"noopener noreferrer\" aria-label=\"View on GitHub\">GitHub</a>",
            escape_html(&app.github)
        ));
    }
    lines.push("  </div>".to_string());
    lines.push("</article>".to_string());
    lines.join("\n")
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn splice(html: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut output = String::with_capacity(html.len() + replacement.len());
    output.push_str(&html[..start]);
    output.push_str(replacement);
    output.push_str(&html[end..]);
    output
}

fn line_indent(html: &str, position: usize) -> &str {
    let line_start = html[..position].rfind('\n').map(|index| index + 1).unwrap_or(0);
    let prefix = &html[line_start..position];
    if prefix.chars().all(|ch| ch == ' ' || ch == '\t') {
        prefix
    } else {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    SelfClosing,
    Close,
    Comment,
    Declaration,
}

#[derive(Debug, Clone)]
struct Tag<'a> {
    kind: TagKind,
    name: String,
    start: usize,
    end: usize,
    source: &'a str,
}

/// Minimal forward scanner over tags. Comments are yielded whole and the raw
/// text of `<script>`/`<style>` is skipped so markup-looking text inside them
/// never counts as a tag.
struct TagScanner<'a> {
    html: &'a str,
    cursor: usize,
}

impl<'a> TagScanner<'a> {
    fn new(html: &'a str) -> Self {
        Self { html, cursor: 0 }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let html = self.html;
        loop {
            let offset = html.get(self.cursor..)?.find('<')?;
            let start = self.cursor + offset;
            let rest = &html[start..];

            if rest.starts_with("<!--") {
                let end = rest[4..]
                    .find("-->")
                    .map(|index| start + 4 + index + 3)
                    .unwrap_or(html.len());
                self.cursor = end;
                return Some(Tag {
                    kind: TagKind::Comment,
                    name: String::new(),
                    start,
                    end,
                    source: &html[start..end],
                });
            }

            let (kind, name_offset) = match rest.as_bytes().get(1) {
                Some(b'/') => (TagKind::Close, 2),
                Some(b'!') | Some(b'?') => (TagKind::Declaration, 2),
                Some(byte) if byte.is_ascii_alphabetic() => (TagKind::Open, 1),
                _ => {
                    self.cursor = start + 1;
                    continue;
                }
            };

            let Some(length) = tag_length(rest) else {
                self.cursor = html.len();
                return None;
            };
            let end = start + length;
            let source = &html[start..end];
            let name = rest[name_offset..]
                .chars()
                .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
                .collect::<String>()
                .to_ascii_lowercase();
            let kind = if kind == TagKind::Open && source[..source.len() - 1].ends_with('/') {
                TagKind::SelfClosing
            } else {
                kind
            };

            self.cursor = end;
            if kind == TagKind::Open && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                let closing = format!("</{name}");
                self.cursor = html[end..]
                    .to_ascii_lowercase()
                    .find(&closing)
                    .map(|index| end + index)
                    .unwrap_or(html.len());
            }

            return Some(Tag {
                kind,
                name,
                start,
                end,
                source,
            });
        }
    }
}

/// Byte length of the tag starting at `rest[0] == '<'`, honouring quoted
/// attribute values.
fn tag_length(rest: &str) -> Option<usize> {
    let mut quote = None::<u8>;
    for (index, byte) in rest.bytes().enumerate().skip(1) {
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(index + 1),
            None => {}
        }
    }
    None
}

fn comment_body(source: &str) -> &str {
    source
        .strip_prefix("<!--")
        .map(|body| body.strip_suffix("-->").unwrap_or(body))
        .unwrap_or(source)
        .trim()
}

fn attribute<'a>(source: &'a str, wanted: &str) -> Option<&'a str> {
    let bytes = source.as_bytes();
    let is_space = |byte: u8| byte.is_ascii_whitespace();
    let mut index = 1;
    while index < bytes.len() && !is_space(bytes[index]) && !matches!(bytes[index], b'>' | b'/') {
        index += 1;
    }

    loop {
        while index < bytes.len() && (is_space(bytes[index]) || bytes[index] == b'/') {
            index += 1;
        }
        if index >= bytes.len() || bytes[index] == b'>' {
            return None;
        }

        let name_start = index;
        while index < bytes.len()
            && !is_space(bytes[index])
            && !matches!(bytes[index], b'=' | b'>' | b'/')
        {
            index += 1;
        }
        let name = &source[name_start..index];
        while index < bytes.len() && is_space(bytes[index]) {
            index += 1;
        }

        let mut value = "";
        if index < bytes.len() && bytes[index] == b'=' {
            index += 1;
            while index < bytes.len() && is_space(bytes[index]) {
                index += 1;
            }
            if index < bytes.len() && matches!(bytes[index], b'"' | b'\'') {
                let quote = bytes[index];
                let value_start = index + 1;
                index = value_start;
                while index < bytes.len() && bytes[index] != quote {
                    index += 1;
                }
                value = &source[value_start..index];
                index += 1;
            } else {
                let value_start = index;
                while index < bytes.len() && !is_space(bytes[index]) && bytes[index] != b'>' {
                    index += 1;
                }
                value = &source[value_start..index];
            }
        }

        if name.eq_ignore_ascii_case(wanted) {
            return Some(value);
        }
    }
}

fn has_class(source: &str, class: &str) -> bool {
    attribute(source, "class")
        .map(|value| value.split_ascii_whitespace().any(|token| token == class))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementSpan {
    start: usize,
    inner_start: usize,
    inner_end: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementLookup {
    Found(ElementSpan),
    Missing,
    Unterminated,
}

/// Locate the first open tag accepted by `matches` and its matching close
/// tag, counting nested elements of the same name.
fn find_element<F>(html: &str, matches: F) -> ElementLookup
where
    F: Fn(&Tag<'_>) -> bool,
{
    let mut scanner = TagScanner::new(html);
    let Some(open) = scanner
        .by_ref()
        .find(|tag| tag.kind == TagKind::Open && matches(tag))
    else {
        return ElementLookup::Missing;
    };

    let mut depth = 1usize;
    for tag in scanner {
        if tag.name != open.name {
            continue;
        }
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return ElementLookup::Found(ElementSpan {
                        start: open.start,
                        inner_start: open.end,
                        inner_end: tag.start,
                        end: tag.end,
                    });
                }
            }
            _ => {}
        }
    }
    ElementLookup::Unterminated
}
