use std::{collections::HashMap, io};

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use super::{
    journal::{validate_draft, DraftLine, JournalDraft, JournalSource},
    money::{parse_amount, to_cents, zero},
};

const COLUMNS: [&str; 6] = [
    "date",
    "entry_number",
    "account_code",
    "debit",
    "credit",
    "description",
];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot read file: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
}

/// One journal to be posted, or the reason the rows sharing its entry
/// number were rejected.
#[derive(Debug)]
pub struct ImportGroup {
    pub entry_number: String,
    pub draft: Result<JournalDraft, String>,
}

struct Row {
    date: NaiveDate,
    line: DraftLine,
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .ok()
}

/// A lone comma is the decimal separator (`12,50`). Next to a point, or
/// repeated, commas group thousands (`1,250.00`, `1,250,000`).
fn normalize_separators(s: &str) -> String {
    if !s.contains('.') && s.matches(',').count() == 1 {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    }
}

fn parse_cell_amount(s: &str) -> Result<BigDecimal, String> {
    parse_amount(&normalize_separators(s))
        .map(|v| v.map(|v| to_cents(&v)).unwrap_or_else(zero))
        .map_err(|e| e.to_string())
}

/// Reads `;`-separated journal lines and groups them by entry number,
/// keeping the order in which entry numbers first appear.
pub fn read_groups(
    input: impl io::Read,
    year_start: NaiveDate,
    year_end: NaiveDate,
) -> Result<Vec<ImportGroup>, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = rdr.headers()?.clone();
    let mut idx = [0usize; 6];
    for (i, name) in COLUMNS.iter().enumerate() {
        idx[i] = match headers.iter().position(|h| h.eq_ignore_ascii_case(name)) {
            Some(p) => p,
            None if *name == "description" => usize::MAX,
            None => return Err(ImportError::MissingColumn(*name)),
        };
    }

    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<Result<Row, String>>> = HashMap::new();

    for record in rdr.records() {
        let record = record?;
        let line_no = record.position().map(|p| p.line()).unwrap_or(0);
        let cell = |i: usize| record.get(i).unwrap_or("").to_string();

        let mut entry_number = cell(idx[1]);
        if entry_number.is_empty() {
            entry_number = format!("line-{line_no}");
        }

        let parsed = (|| {
            let date = parse_date(&cell(idx[0]))
                .ok_or_else(|| format!("line {line_no}: invalid date '{}'", cell(idx[0])))?;
            let account_code = cell(idx[2]);
            if account_code.is_empty() {
                return Err(format!("line {line_no}: missing account code"));
            }
            let debit = parse_cell_amount(&cell(idx[3])).map_err(|e| format!("line {line_no}: {e}"))?;
            let credit = parse_cell_amount(&cell(idx[4])).map_err(|e| format!("line {line_no}: {e}"))?;
            let description = Some(cell(idx[5])).filter(|d| !d.is_empty());
            Ok(Row {
                date,
                line: DraftLine {
                    account_code,
                    debit,
                    credit,
                    description,
                },
            })
        })();

        if !rows.contains_key(&entry_number) {
            order.push(entry_number.clone());
        }
        rows.entry(entry_number).or_default().push(parsed);
    }

    Ok(order
        .into_iter()
        .map(|entry_number| {
            let group_rows = rows.remove(&entry_number).unwrap_or_default();
            let draft = build_draft(&entry_number, group_rows, year_start, year_end);
            ImportGroup { entry_number, draft }
        })
        .collect())
}

fn build_draft(
    entry_number: &str,
    rows: Vec<Result<Row, String>>,
    year_start: NaiveDate,
    year_end: NaiveDate,
) -> Result<JournalDraft, String> {
    let rows = rows.into_iter().collect::<Result<Vec<Row>, String>>()?;
    let date = rows
        .first()
        .map(|r| r.date)
        .ok_or_else(|| "no lines".to_string())?;
    if rows.iter().any(|r| r.date != date) {
        return Err("lines of one entry carry different dates".to_string());
    }
    if date < year_start || date > year_end {
        return Err(format!("date {date} is outside the fiscal year"));
    }

    let draft = JournalDraft {
        date,
        description: format!("Imported entry {entry_number}"),
        source: JournalSource::Import,
        source_ref: Some(entry_number.to_string()),
        lines: rows.into_iter().map(|r| r.line).collect(),
    };
    validate_draft(&draft).map_err(|e| e.to_string())?;
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn read(input: &str) -> Vec<ImportGroup> {
        read_groups(input.as_bytes(), ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap()
    }

    #[test]
    fn groups_by_entry_number() {
        let groups = read(
            "date;entry_number;account_code;debit;credit;description\n\
             2024-02-01;OB-1;1111;1000,00;;opening cash\n\
             2024-02-01;OB-2;1121;500;;\n\
             01.02.2024;OB-1;3110;;1000;opening equity\n\
             2024-02-01;OB-2;3110;;500;\n",
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].entry_number, "OB-1");
        let draft = groups[0].draft.as_ref().unwrap();
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].description.as_deref(), Some("opening cash"));
        assert_eq!(draft.source_ref.as_deref(), Some("OB-1"));
        assert!(groups[1].draft.is_ok());
    }

    #[test]
    fn failing_group_is_reported_not_fatal() {
        let groups = read(
            "date;entry_number;account_code;debit;credit;description\n\
             2024-03-01;A;1111;10;;\n\
             2024-03-01;A;3110;;9;\n\
             2024-03-01;B;1111;5;;\n\
             2024-03-01;B;3110;;5;\n\
             2023-12-31;C;1111;5;;\n\
             2023-12-31;C;3110;;5;\n\
             bad;D;1111;5;;\n",
        );
        assert_eq!(groups.len(), 4);
        assert!(groups[0].draft.as_ref().unwrap_err().contains("not balanced"));
        assert!(groups[1].draft.is_ok());
        assert!(groups[2].draft.as_ref().unwrap_err().contains("outside the fiscal year"));
        assert!(groups[3].draft.as_ref().unwrap_err().contains("invalid date"));
    }

    #[test]
    fn missing_column_is_fatal() {
        let err = read_groups(
            "date;entry;account_code;debit;credit\n".as_bytes(),
            ymd(2024, 1, 1),
            ymd(2024, 12, 31),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("entry_number")));
    }

    #[test]
    fn dates_in_both_formats() {
        assert_eq!(parse_date("2024-05-06"), Some(ymd(2024, 5, 6)));
        assert_eq!(parse_date("06.05.2024"), Some(ymd(2024, 5, 6)));
        assert_eq!(parse_date("05/06/2024"), None);
    }

    #[test]
    fn amount_separators() {
        assert_eq!(parse_cell_amount("1,250.00").unwrap(), BigDecimal::from(1250));
        assert_eq!(parse_cell_amount("12,50").unwrap(), "12.5".parse::<BigDecimal>().unwrap());
        assert_eq!(parse_cell_amount("1,250,000").unwrap(), BigDecimal::from(1_250_000));
        assert_eq!(parse_cell_amount("99.9").unwrap(), "99.9".parse::<BigDecimal>().unwrap());
        assert_eq!(parse_cell_amount("").unwrap(), zero());
        assert!(parse_cell_amount("1,2,x").is_err());
    }
}
