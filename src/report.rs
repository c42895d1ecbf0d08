//! CSV and HTML reports for a finished batch.

use crate::{ResultRecord, ResultSet, RunLayout, SweepError, SCREENSHOT_NONE};
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub const CSV_HEADER: &str = "Website URL Address,Title Name,Status,Screenshot Path";

/// Rows shown per page in the HTML table.
pub const ROWS_PER_PAGE: usize = 20;

#[derive(Debug, Serialize)]
struct ReportItem<'a> {
    url: &'a str,
    /// Only web URLs become clickable links.
    linkable: bool,
    title: &'a str,
    status: &'a str,
    screenshot: String,
    response: &'a str,
    success: bool,
}

/// Write `<batch>.csv` and `<batch>.html` next to the run directory.
pub async fn generate_reports(layout: &RunLayout, results: &ResultSet) -> Result<(), SweepError> {
    let rows = sorted_rows(results);

    let csv_path = layout.csv_report_path();
    write_report(&csv_path, render_csv(&rows)?).await?;

    let html_path = layout.html_report_path();
    write_report(&html_path, render_html(layout.batch_name(), &rows)?).await?;

    info!(
        csv = %csv_path.display(),
        html = %html_path.display(),
        "Reports written for {} endpoints",
        rows.len()
    );
    Ok(())
}

async fn write_report(path: &Path, contents: String) -> Result<(), SweepError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| SweepError::Report(format!("failed to write {}: {}", path.display(), e)))
}

fn sorted_rows(results: &ResultSet) -> Vec<(&str, &ResultRecord)> {
    let mut rows: Vec<_> = results.iter().map(|(url, r)| (url.as_str(), r)).collect();
    rows.sort_unstable_by_key(|(url, _)| *url);
    rows
}

pub(crate) fn render_csv(rows: &[(&str, &ResultRecord)]) -> Result<String, SweepError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| SweepError::Report(format!("CSV encoding failed: {e}"));

    writer
        .write_record(CSV_HEADER.split(','))
        .map_err(csv_error)?;
    for (url, record) in rows {
        writer
            .write_record([
                *url,
                record.title.as_str(),
                record.status_code.as_str(),
                record.screenshot_ref.as_str(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SweepError::Report(format!("CSV encoding failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| SweepError::Report(format!("CSV encoding failed: {e}")))
}

pub(crate) fn render_html(
    batch_name: &str,
    rows: &[(&str, &ResultRecord)],
) -> Result<String, SweepError> {
    let items: Vec<ReportItem<'_>> = rows
        .iter()
        .map(|&(url, record)| ReportItem {
            url,
            linkable: is_web_url(url),
            title: &record.title,
            status: &record.status_code,
            // The report sits beside the run directory, so images are
            // addressed through it.
            screenshot: if record.screenshot_ref == SCREENSHOT_NONE {
                SCREENSHOT_NONE.to_string()
            } else {
                format!("{}/{}", batch_name, record.screenshot_ref)
            },
            response: &record.response_summary,
            success: record.success,
        })
        .collect();

    let succeeded = items.iter().filter(|i| i.success).count();
    let summary = format!(
        "Total: {} | Succeeded: {} | Failed: {}",
        items.len(),
        succeeded,
        items.len() - succeeded
    );

    // `</` inside a JSON string would close the <script> element.
    let data = serde_json::to_string(&items)?.replace("</", "<\\/");

    Ok(HTML_TEMPLATE
        .replace("{{BATCH}}", &html_escape(batch_name))
        .replace("{{SUMMARY}}", &summary)
        .replace("{{PER_PAGE}}", &ROWS_PER_PAGE.to_string())
        .replace("{{DATA}}", &data))
}

fn is_web_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Endpoint snapshot report - {{BATCH}}</title>
<style>
  body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 24px; background: #f6f7f9; color: #222; }
  h1 { font-size: 22px; margin-bottom: 4px; }
  .summary { color: #555; margin-bottom: 16px; }
  table { width: 100%; border-collapse: collapse; background: #fff; }
  th, td { border: 1px solid #ddd; padding: 8px; vertical-align: top; text-align: left; }
  th { background: #2f3b4c; color: #fff; }
  td.url a { color: #1a5fb4; word-break: break-all; }
  .screenshot { max-width: 320px; max-height: 200px; cursor: zoom-in; border: 1px solid #ccc; }
  .response { max-height: 200px; overflow: auto; white-space: pre-wrap; font-family: monospace; font-size: 12px; }
  .status-ok { color: #1e7b34; font-weight: bold; }
  .status-timeout { color: #b58105; font-weight: bold; }
  .status-dns { color: #8a3ab9; font-weight: bold; }
  .status-ssl { color: #c35a00; font-weight: bold; }
  .status-error { color: #c01c28; font-weight: bold; }
  #pagination { margin-top: 16px; }
  #pagination button { margin-right: 4px; padding: 4px 10px; }
  #pagination button.active { background: #2f3b4c; color: #fff; }
  #modal { display: none; position: fixed; inset: 0; background: rgba(0,0,0,0.85); justify-content: center; align-items: center; }
  #modal img { max-width: 95%; max-height: 95%; }
</style>
</head>
<body>
<h1>Endpoint snapshot report</h1>
<div class="summary">{{BATCH}} &middot; {{SUMMARY}}</div>
<table>
  <thead><tr><th>URL</th><th>Title</th><th>Status</th><th>Screenshot</th><th>Response</th></tr></thead>
  <tbody id="rows"></tbody>
</table>
<div id="pagination"></div>
<div id="modal" onclick="this.style.display='none'"><img id="modal-img" alt=""></div>
<script>
const items = {{DATA}};
const perPage = {{PER_PAGE}};
let page = 1;
const pages = Math.max(1, Math.ceil(items.length / perPage));

function statusClass(status) {
  switch (status) {
    case 'TIMEOUT': return 'status-timeout';
    case 'DNS_ERROR': return 'status-dns';
    case 'SSL_ERROR': return 'status-ssl';
    case 'CONNECTION_REFUSED':
    case 'ERROR': return 'status-error';
  }
  return /^[45]/.test(status) ? 'status-error' : 'status-ok';
}

function openModal(src) {
  document.getElementById('modal-img').src = src;
  document.getElementById('modal').style.display = 'flex';
}

function renderRows() {
  const body = document.getElementById('rows');
  body.replaceChildren();
  for (const item of items.slice((page - 1) * perPage, page * perPage)) {
    const row = body.insertRow();

    const urlCell = row.insertCell();
    urlCell.className = 'url';
    if (item.linkable) {
      const link = document.createElement('a');
      link.href = item.url;
      link.target = '_blank';
      link.rel = 'noopener noreferrer';
      link.textContent = item.url;
      urlCell.appendChild(link);
    } else {
      urlCell.textContent = item.url;
    }

    row.insertCell().textContent = item.title;

    const status = document.createElement('span');
    status.className = statusClass(item.status);
    status.textContent = item.status;
    row.insertCell().appendChild(status);

    const shotCell = row.insertCell();
    if (item.screenshot !== 'none') {
      const img = document.createElement('img');
      img.src = item.screenshot;
      img.className = 'screenshot';
      img.loading = 'lazy';
      img.onclick = () => openModal(img.src);
      shotCell.appendChild(img);
    } else {
      shotCell.textContent = 'No screenshot';
    }

    const response = document.createElement('div');
    response.className = 'response';
    response.textContent = item.response;
    row.insertCell().appendChild(response);
  }
}

function renderPagination() {
  const nav = document.getElementById('pagination');
  nav.replaceChildren();
  const button = (label, target, disabled, active) => {
    const b = document.createElement('button');
    b.textContent = label;
    b.disabled = disabled;
    if (active) b.className = 'active';
    b.onclick = () => { page = target; render(); };
    nav.appendChild(b);
  };
  button('Prev', page - 1, page === 1, false);
  for (let i = Math.max(1, page - 2); i <= Math.min(pages, page + 2); i++) {
    button(String(i), i, false, i === page);
  }
  button('Next', page + 1, page === pages, false);
}

function render() {
  renderRows();
  renderPagination();
}

render();
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageFormat;

    fn record(title: &str, status: &str, shot: &str, response: &str, success: bool) -> ResultRecord {
        ResultRecord {
            title: title.to_string(),
            status_code: status.to_string(),
            screenshot_ref: shot.to_string(),
            response_summary: response.to_string(),
            success,
        }
    }

    fn sample() -> ResultSet {
        let mut results = ResultSet::new();
        results.insert(
            "https://b.com".to_string(),
            record("Hello, \"world\"", "200", "data/b.com-r.png", "HTTP/1.1 200 OK", true),
        );
        results.insert(
            "https://a.com".to_string(),
            record("No Title", "TIMEOUT", "none", "capture failed after 4 attempts", false),
        );
        results
    }

    #[test]
    fn csv_rows_sorted_and_quoted() {
        let results = sample();
        let csv = render_csv(&sorted_rows(&results)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "https://a.com,No Title,TIMEOUT,none");
        assert_eq!(
            lines[2],
            "https://b.com,\"Hello, \"\"world\"\"\",200,data/b.com-r.png"
        );
    }

    #[test]
    fn html_embeds_escaped_data_and_summary() {
        let mut results = sample();
        results.insert(
            "https://c.com".to_string(),
            record("</script><b>", "200", "data/c.com-r.png", "x", true),
        );
        let html = render_html("result_x", &sorted_rows(&results)).unwrap();

        assert!(html.contains("Total: 3 | Succeeded: 2 | Failed: 1"));
        assert!(html.contains(r#""screenshot":"result_x/data/b.com-r.png""#));
        assert!(html.contains(r#""screenshot":"none""#));
        assert!(!html.contains("</script><b>"));
        assert!(html.contains("<\\/script><b>"));
    }

    #[test]
    fn only_web_urls_are_linkable() {
        let mut results = sample();
        results.insert(
            "javascript:alert(1)//http://x".to_string(),
            record("No Title", "ERROR", "none", "x", false),
        );
        let html = render_html("result_x", &sorted_rows(&results)).unwrap();

        assert!(html.contains(r#""url":"javascript:alert(1)//http://x","linkable":false"#));
        assert!(html.contains(r#""url":"https://a.com","linkable":true"#));
        assert!(html.contains("if (item.linkable)"));
    }

    #[tokio::test]
    async fn reports_written_beside_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "result_202401010001", ImageFormat::Png);
        layout.prepare().await.unwrap();

        generate_reports(&layout, &sample()).await.unwrap();

        let csv = std::fs::read_to_string(layout.csv_report_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(layout.html_report_path().exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path().join("missing"), "r", ImageFormat::Png);
        let err = generate_reports(&layout, &sample()).await.unwrap_err();
        assert!(matches!(err, SweepError::Report(_)));
    }
}
