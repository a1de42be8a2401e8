//! Weekly digest rendering (HTML and plain text).

use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::models::SearchRecord;

const TEXT_SNIPPET_CHARS: usize = 150;
const NO_DESCRIPTION: &str = "Sem descrição disponível.";

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; background: #f5f5f5; }
    .header { background: linear-gradient(135deg, #dc2626, #b91c1c); color: white; padding: 30px; border-radius: 12px; text-align: center; }
    .stats { display: flex; gap: 15px; margin: 20px 0; }
    .stat { flex: 1; background: white; padding: 20px; border-radius: 8px; text-align: center; }
    .stat-number { font-size: 32px; font-weight: bold; color: #dc2626; }
    .article { background: white; padding: 20px; border-radius: 8px; margin: 15px 0; }
    .article-title { font-size: 18px; font-weight: 600; color: #1e40af; text-decoration: none; }
    .article-source { background: #fee2e2; color: #991b1b; padding: 4px 10px; border-radius: 4px; font-size: 12px; display: inline-block; margin: 10px 0; }
    .article-snippet { color: #555; font-size: 14px; line-height: 1.6; }
    .footer { text-align: center; padding: 30px; color: #666; border-top: 1px solid #eee; margin-top: 30px; }
"#;

/// A rendered digest ready to hand to a [`super::Mailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn subject(count: usize) -> String {
    format!("🏥 Relatório Semanal - {} Artigos sobre Medicina Sem Sangue", count)
}

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
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

fn distinct_sources(records: &[SearchRecord]) -> usize {
    records
        .iter()
        .map(|r| r.source.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn render_digest(records: &[SearchRecord], generated_at: DateTime<Utc>) -> Digest {
    Digest {
        subject: subject(records.len()),
        html: render_html(records, generated_at),
        text: render_text(records, generated_at),
    }
}

pub fn render_html(records: &[SearchRecord], generated_at: DateTime<Utc>) -> String {
    let date = generated_at.format("%d/%m/%Y");
    let mut html = String::new();

    // Writing to a String cannot fail.
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="pt">
<head>
  <meta charset="UTF-8">
  <style>{style}</style>
</head>
<body>
  <div class="header">
    <h1>🏥 Monitor de Medicina Sem Sangue</h1>
    <p>Relatório Automático Semanal</p>
    <p style="opacity: 0.8;">{date}</p>
  </div>
  <div class="stats">
    <div class="stat"><div class="stat-number">{count}</div><div>Artigos Encontrados</div></div>
    <div class="stat"><div class="stat-number">{sources}</div><div>Fontes Médicas</div></div>
  </div>
  <h2>📄 Artigos da Semana</h2>
"#,
        style = STYLE,
        date = date,
        count = records.len(),
        sources = distinct_sources(records),
    );

    for record in records {
        let snippet = if record.snippet.is_empty() {
            NO_DESCRIPTION
        } else {
            record.snippet.as_str()
        };
        let _ = write!(
            html,
            r#"  <div class="article">
    <a href="{url}" class="article-title" target="_blank">{title}</a><br>
    <span class="article-source">{source}</span>
    <p class="article-snippet">{snippet}</p>
  </div>
"#,
            url = escape_html(&record.url),
            title = escape_html(&record.title),
            source = escape_html(&record.source),
            snippet = escape_html(snippet),
        );
    }

    html.push_str(
        r#"  <div class="footer">
    <p>Este relatório foi gerado automaticamente pelo Monitor de Medicina Sem Sangue.</p>
  </div>
</body>
</html>
"#,
    );
    html
}

pub fn render_text(records: &[SearchRecord], generated_at: DateTime<Utc>) -> String {
    let rule = "=====================================";
    let mut text = String::new();

    let _ = writeln!(text, "MONITOR DE MEDICINA SEM SANGUE");
    let _ = writeln!(text, "Relatório Automático Semanal");
    let _ = writeln!(text, "Data: {}", generated_at.format("%d/%m/%Y"));
    let _ = writeln!(text);
    let _ = writeln!(text, "{}", rule);
    let _ = writeln!(text, "ARTIGOS ENCONTRADOS: {}", records.len());
    let _ = writeln!(text, "FONTES: {}", distinct_sources(records));
    let _ = writeln!(text, "{}", rule);

    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(text);
        let _ = writeln!(text, "{}. {}", i + 1, record.title);
        let _ = writeln!(text, "   Fonte: {}", record.source);
        let _ = writeln!(text, "   Link: {}", record.url);
        if !record.snippet.is_empty() {
            let short: String = record.snippet.chars().take(TEXT_SNIPPET_CHARS).collect();
            let _ = writeln!(text, "   Resumo: {}...", short);
        }
    }

    let _ = writeln!(text);
    let _ = writeln!(text, "{}", rule);
    text.push_str("Relatório gerado automaticamente.");
    text
}
