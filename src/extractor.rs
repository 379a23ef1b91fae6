use crate::errors::WhoisError;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

static TD_CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static td selector"));

/// Concatenate the text of every `<td>` cell of an origin page, in document
/// order, one cell per line.
pub fn flatten_cells(html: &str) -> String {
    let document = Html::parse_document(html);

    document
        .select(&TD_CELLS)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DomainName,
    Status,
    Registrar,
    NameServers,
    CreatedOn,
    LastUpdatedOn,
    ExpirationDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// The whole line after the label.
    Line,
    /// First whitespace-delimited token of the line after the label; the
    /// page appends human-readable text after dates.
    FirstToken,
    /// Every non-empty line up to the next known label.
    Block,
}

struct FieldRule {
    field: Field,
    label: &'static str,
    capture: Capture,
    required: bool,
}

const FIELD_RULES: &[FieldRule] = &[
    FieldRule { field: Field::DomainName, label: "Доменное имя:", capture: Capture::Line, required: true },
    FieldRule { field: Field::Status, label: "Статус:", capture: Capture::Line, required: true },
    FieldRule { field: Field::Registrar, label: "Регистратор:", capture: Capture::Line, required: false },
    FieldRule { field: Field::NameServers, label: "Серверы имен:", capture: Capture::Block, required: false },
    FieldRule { field: Field::CreatedOn, label: "Создан:", capture: Capture::FirstToken, required: false },
    FieldRule { field: Field::LastUpdatedOn, label: "Последнее изменение:", capture: Capture::FirstToken, required: false },
    FieldRule { field: Field::ExpirationDate, label: "Дата окончания:", capture: Capture::FirstToken, required: false },
];

/// Fields pulled out of a flattened WHOIS table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedFields {
    pub domain_name: String,
    pub status: String,
    pub registrar: Option<String>,
    pub name_servers: Vec<String>,
    pub created_on: Option<String>,
    pub last_updated_on: Option<String>,
    pub expiration_date: Option<String>,
}

/// Scans flattened page text for the labelled rows of the ps.kz WHOIS table.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every known field. Fails with `MalformedOrigin` when the
    /// domain name or status row is missing; other rows are optional.
    pub fn extract(&self, text: &str) -> Result<ExtractedFields, WhoisError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut fields = ExtractedFields::default();

        for rule in FIELD_RULES {
            let values = match rule.capture {
                Capture::Block => capture_block(&lines, rule.label),
                Capture::Line | Capture::FirstToken => {
                    capture_line(&lines, rule.label, rule.capture).into_iter().collect()
                }
            };

            if values.is_empty() {
                if rule.required {
                    return Err(WhoisError::MalformedOrigin(format!(
                        "missing mandatory label {:?}",
                        rule.label
                    )));
                }
                debug!("Label {:?} not found, leaving default", rule.label);
                continue;
            }

            let mut values = values.into_iter();
            match rule.field {
                Field::DomainName => fields.domain_name = values.next().unwrap_or_default(),
                Field::Status => fields.status = values.next().unwrap_or_default(),
                Field::Registrar => fields.registrar = values.next(),
                Field::NameServers => fields.name_servers = values.collect(),
                Field::CreatedOn => fields.created_on = values.next(),
                Field::LastUpdatedOn => fields.last_updated_on = values.next(),
                Field::ExpirationDate => fields.expiration_date = values.next(),
            }
        }

        Ok(fields)
    }
}

fn is_label_line(line: &str, label: &str) -> bool {
    line.ends_with(label)
}

fn is_any_label(line: &str) -> bool {
    FIELD_RULES.iter().any(|rule| is_label_line(line, rule.label))
}

fn capture_line(lines: &[&str], label: &str, capture: Capture) -> Option<String> {
    lines
        .windows(2)
        .find(|pair| is_label_line(pair[0], label) && !pair[1].is_empty())
        .map(|pair| match capture {
            Capture::FirstToken => pair[1].split_whitespace().next().unwrap_or(pair[1]).to_string(),
            _ => pair[1].to_string(),
        })
}

fn capture_block(lines: &[&str], label: &str) -> Vec<String> {
    let Some(start) = lines.iter().position(|line| is_label_line(line, label)) else {
        return Vec::new();
    };

    let rest = &lines[start + 1..];
    // The block only counts when another known label closes it.
    let Some(end) = rest.iter().position(|line| is_any_label(line)) else {
        return Vec::new();
    };

    rest[..end]
        .iter()
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RECORD: &str = "Доменное имя:\nexample.kz\nСтатус:\nclientTransferProhibited\nРегистратор:\nPS Internet Company LLP\nСерверы имен:\nns1.example\nns2.example\nСоздан:\n2010-03-15 12:00:00 (GMT+0:00)\nПоследнее изменение:\n2023-01-20 08:30:00 (GMT+0:00)\nДата окончания:\n2025-03-15 осталось 30 дней";

    #[test]
    fn test_full_record() {
        let fields = FieldExtractor::new().extract(FULL_RECORD).unwrap();

        assert_eq!(fields.domain_name, "example.kz");
        assert_eq!(fields.status, "clientTransferProhibited");
        assert_eq!(fields.registrar.as_deref(), Some("PS Internet Company LLP"));
        assert_eq!(fields.name_servers, vec!["ns1.example", "ns2.example"]);
        assert_eq!(fields.created_on.as_deref(), Some("2010-03-15"));
        assert_eq!(fields.last_updated_on.as_deref(), Some("2023-01-20"));
        assert_eq!(fields.expiration_date.as_deref(), Some("2025-03-15"));
    }

    #[test]
    fn test_mandatory_labels_only() {
        let fields = FieldExtractor::new()
            .extract("Доменное имя:\nexample.kz\nСтатус:\nok")
            .unwrap();

        assert_eq!(fields.domain_name, "example.kz");
        assert_eq!(fields.status, "ok");
        assert_eq!(fields.registrar, None);
        assert!(fields.name_servers.is_empty());
        assert_eq!(fields.created_on, None);
        assert_eq!(fields.last_updated_on, None);
        assert_eq!(fields.expiration_date, None);
    }

    #[test]
    fn test_missing_status_is_malformed() {
        let result = FieldExtractor::new().extract("Доменное имя:\nexample.kz\nРегистратор:\nSomeone");
        assert!(matches!(result, Err(WhoisError::MalformedOrigin(_))));
    }

    #[test]
    fn test_missing_domain_name_is_malformed() {
        let result = FieldExtractor::new().extract("Статус:\nok");
        assert!(matches!(result, Err(WhoisError::MalformedOrigin(_))));
    }

    #[test]
    fn test_name_servers_block() {
        let text = "Доменное имя:\nexample.kz\nСтатус:\nok\nСерверы имен:\nns1.example\nns2.example\nСоздан:\n2020-01-01 ...";
        let fields = FieldExtractor::new().extract(text).unwrap();
        assert_eq!(fields.name_servers, vec!["ns1.example", "ns2.example"]);
        assert_eq!(fields.created_on.as_deref(), Some("2020-01-01"));
    }

    #[test]
    fn test_name_servers_skip_blank_lines() {
        let text = "Доменное имя:\nexample.kz\nСтатус:\nok\nСерверы имен:\n  ns1.example  \n\nns2.example\nДата окончания:\n2030-01-01";
        let fields = FieldExtractor::new().extract(text).unwrap();
        assert_eq!(fields.name_servers, vec!["ns1.example", "ns2.example"]);
    }

    #[test]
    fn test_unterminated_name_servers_block_is_absent() {
        let text = "Доменное имя:\nexample.kz\nСтатус:\nok\nСерверы имен:\nns1.example";
        let fields = FieldExtractor::new().extract(text).unwrap();
        assert!(fields.name_servers.is_empty());
    }

    #[test]
    fn test_optional_labels_are_independent() {
        let text = "Доменное имя:\nexample.kz\nСтатус:\nok\nДата окончания:\n2031-07-01 (осталось много дней)";
        let fields = FieldExtractor::new().extract(text).unwrap();
        assert_eq!(fields.registrar, None);
        assert_eq!(fields.expiration_date.as_deref(), Some("2031-07-01"));
    }

    #[test]
    fn test_flatten_cells() {
        let html = r#"<html><body><table>
            <tr><td class="label">Доменное имя:</td><td><b>example.kz</b></td></tr>
            <tr><td>Статус:</td><td>
                ok
            </td></tr>
            <tr><TD>Регистратор:</TD><td>A &amp; B LLP</td></tr>
        </table></body></html>"#;

        assert_eq!(
            flatten_cells(html),
            "Доменное имя:\nexample.kz\nСтатус:\nok\nРегистратор:\nA & B LLP"
        );
    }

    #[test]
    fn test_flatten_without_cells() {
        assert_eq!(flatten_cells("<p>nothing here</p>"), "");
    }

    #[test]
    fn test_named_and_numeric_entities() {
        assert_eq!(
            flatten_cells("<table><tr><td>Регистратор:</td><td>ТОО &laquo;PS&raquo; &mdash; KZ</td></tr></table>"),
            "Регистратор:\nТОО «PS» — KZ"
        );
        assert_eq!(flatten_cells("<table><tr><td>&#1057;&#x43e;</td></tr></table>"), "Со");
    }

    #[test]
    fn test_omitted_end_tags() {
        let html = "<table><tr><td>Доменное имя:<td>example.kz<tr><td>Статус:<td>ok</table>";
        let text = flatten_cells(html);
        assert_eq!(text, "Доменное имя:\nexample.kz\nСтатус:\nok");

        let fields = FieldExtractor::new().extract(&text).unwrap();
        assert_eq!(fields.domain_name, "example.kz");
        assert_eq!(fields.status, "ok");
    }

    #[test]
    fn test_nested_table_keeps_following_cells() {
        let html = "<table><tr><td>Серверы имен:</td><td><table><tr><td>ns1.example</td></tr></table></td></tr>\
                    <tr><td>Создан:</td><td>2020-01-01</td></tr></table>";
        let text = flatten_cells(html);
        assert!(text.ends_with("Создан:\n2020-01-01"));
        assert!(text.contains("ns1.example"));
    }
}
