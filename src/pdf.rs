//! Printable declaration documents.
//!
//! A declaration is first described as pages of labelled lines
//! ([`Document`]), then handed to a [`Renderer`] which produces the bytes
//! offered for download.

use std::fmt::{Display, Write};

use chrono::{DateTime, NaiveDate};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use serde::Serialize;

use crate::declaration::{Declaration, Sex};

pub const TITLE: &str = "Déclaration de naissance";
pub const MISSING: &str = "Non renseigné";
/// Lines taken by the document title on the first page.
const TITLE_LINES: usize = 2;

// A4, in millimetres.
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const INDENT: f32 = 6.0;
const LINE_HEIGHT: f32 = 6.0;
const TITLE_SIZE: f32 = 16.0;
const FONT_SIZE: f32 = 10.0;
const LAYER: &str = "declaration";

#[derive(Debug, thiserror::Error)]
#[error("cannot render document: {0}")]
pub struct RenderError(String);

impl RenderError {
    fn new(err: impl Display) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageSize {
    A4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub lines: Vec<Line>,
}

impl Section {
    /// Lines used on a page, heading included.
    pub fn height(&self) -> usize {
        self.lines.len() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: usize,
    pub sections: Vec<Section>,
}

/// Page-described document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub title: String,
    pub size: PageSize,
    pub pages: Vec<Page>,
}

fn or_missing(value: &str) -> String {
    if value.trim().is_empty() {
        MISSING.to_owned()
    } else {
        value.to_owned()
    }
}

/// `DD/MM/YYYY` when the value is a date, the value itself otherwise.
pub fn format_date(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return MISSING.to_owned();
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()));

    match date {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => value.to_owned(),
    }
}

fn line(label: &str, value: String) -> Line {
    Line {
        label: label.to_owned(),
        value,
    }
}

fn section(title: &str, lines: Vec<Line>) -> Section {
    Section {
        title: title.to_owned(),
        lines,
    }
}

/// Sections of `declaration`, in print order.
pub fn sections(declaration: &Declaration) -> Vec<Section> {
    let child = &declaration.child;
    let father = &declaration.father;
    let mother = &declaration.mother;
    let marriage = &declaration.marriage;
    let declarant = &declaration.declarant;
    let documents = &declaration.documents;

    let sex = match child.sex {
        Some(Sex::Male) => "Garçon".to_owned(),
        Some(Sex::Female) => "Fille".to_owned(),
        None => MISSING.to_owned(),
    };

    vec![
        section(
            "Enfant",
            vec![
                line("Nom", or_missing(&child.surname)),
                line("Prénom", or_missing(&child.given_name)),
                line("Date de naissance", format_date(&child.birth_date)),
                line("Heure de naissance", or_missing(&child.birth_time)),
                line("Lieu de naissance", or_missing(&child.birth_place)),
                line("Sexe", sex),
            ],
        ),
        section(
            "Parents mariés",
            vec![line(
                "Parents mariés",
                if marriage.married { "Oui" } else { "Non" }.to_owned(),
            )],
        ),
        section(
            "Père",
            vec![
                line("Nom", or_missing(&father.surname)),
                line("Prénom", or_missing(&father.given_name)),
                line("Date de naissance", format_date(&father.birth_date)),
                line("Lieu", or_missing(&father.birth_place)),
                line("Profession", or_missing(&father.profession)),
                line("Nationalité", or_missing(&father.nationality)),
                line("Adresse", or_missing(&father.address)),
                line("Pièce d'identité", or_missing(&father.id_document)),
                line("Statut", father.status.label().to_owned()),
            ],
        ),
        section(
            "Mère",
            vec![
                line("Nom", or_missing(&mother.surname)),
                line("Prénom", or_missing(&mother.given_name)),
                line("Nom de jeune fille", or_missing(&mother.maiden_name)),
                line("Date de naissance", format_date(&mother.birth_date)),
                line("Lieu", or_missing(&mother.birth_place)),
                line("Profession", or_missing(&mother.profession)),
                line("Nationalité", or_missing(&mother.nationality)),
                line("Adresse", or_missing(&mother.address)),
                line("Pièce d'identité", or_missing(&mother.id_document)),
                line("Statut", mother.status.label().to_owned()),
            ],
        ),
        section(
            "Informations du mariage",
            vec![
                line("Statut marital", or_missing(&marriage.marital_status)),
                line("Date de mariage", format_date(&marriage.date)),
                line("Lieu de mariage", or_missing(&marriage.place)),
            ],
        ),
        section(
            "Déclarant",
            vec![
                line("Nom", or_missing(&declarant.surname)),
                line("Prénom", or_missing(&declarant.given_name)),
                line("Adresse", or_missing(&declarant.address)),
                line("Lien avec l'enfant", or_missing(&declarant.relationship)),
                line("Pièce d'identité", or_missing(&declarant.id_document)),
            ],
        ),
        section(
            "Documents",
            vec![
                line("Certificat d'accouchement", or_missing(&documents.delivery_certificate)),
                line("Livret de famille", or_missing(&documents.family_record_book)),
                line("Acte naissance père", or_missing(&documents.father_birth_certificate)),
                line("Acte naissance mère", or_missing(&documents.mother_birth_certificate)),
                line("Acte reconnaissance", or_missing(&documents.acknowledgement_deed)),
                line("Certificat nationalité", or_missing(&documents.nationality_certificate)),
            ],
        ),
        section(
            "Déclaration",
            vec![line(
                "Date déclaration",
                format_date(declaration.declared_at.as_deref().unwrap_or_default()),
            )],
        ),
    ]
}

fn flush(pages: &mut Vec<Page>, current: &mut Vec<Section>, used: &mut usize) {
    pages.push(Page {
        number: pages.len() + 1,
        sections: std::mem::take(current),
    });
    *used = 0;
}

/// Lay `sections` on pages of at most `lines_per_page` lines.
///
/// A section moves to the next page when it does not fit, and is only
/// split when it is taller than a whole page.
pub fn paginate(sections: Vec<Section>, lines_per_page: usize) -> Vec<Page> {
    // a page must hold at least a heading and one line.
    let budget = lines_per_page.max(2);
    let mut pages = Vec::new();
    let mut current: Vec<Section> = Vec::new();
    let mut used = TITLE_LINES.min(budget - 2);

    for section in sections {
        if used + section.height() > budget && !current.is_empty() {
            flush(&mut pages, &mut current, &mut used);
        }

        if used + section.height() <= budget {
            used += section.height();
            current.push(section);
            continue;
        }

        // taller than what is left on an empty page.
        let mut lines = section.lines.into_iter().peekable();
        while lines.peek().is_some() {
            let room = budget - used - 1;
            let chunk: Vec<Line> = lines.by_ref().take(room).collect();
            used += chunk.len() + 1;
            current.push(Section {
                title: section.title.clone(),
                lines: chunk,
            });
            if lines.peek().is_some() {
                flush(&mut pages, &mut current, &mut used);
            }
        }
    }

    if !current.is_empty() || pages.is_empty() {
        flush(&mut pages, &mut current, &mut used);
    }
    pages
}

/// Build the printable document of `declaration`.
pub fn build(declaration: &Declaration, lines_per_page: usize) -> Document {
    Document {
        title: TITLE.to_owned(),
        size: PageSize::A4,
        pages: paginate(sections(declaration), lines_per_page),
    }
}

/// Name of the downloaded file.
pub fn file_name(declaration: &Declaration, extension: &str) -> String {
    let clean = |value: &str| -> String {
        value
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    };

    format!(
        "declaration-{}-{}.{extension}",
        clean(&declaration.child.surname),
        clean(&declaration.child.given_name)
    )
}

/// Turns a [`Document`] into downloadable bytes.
pub trait Renderer: Send + Sync {
    /// MIME type of the output.
    fn content_type(&self) -> &'static str;

    /// File extension of the output, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, document: &Document) -> Result<Vec<u8>, RenderError>;
}

/// A4 PDF renderer using the built-in Helvetica faces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfRenderer;

impl Renderer for PdfRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, document: &Document) -> Result<Vec<u8>, RenderError> {
        let (pdf, first_page, first_layer) = PdfDocument::new(
            document.title.as_str(),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            LAYER,
        );
        let regular = pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(RenderError::new)?;
        let bold = pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(RenderError::new)?;

        let total = document.pages.len();
        for (index, page) in document.pages.iter().enumerate() {
            let layer = if index == 0 {
                pdf.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) = pdf.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER);
                pdf.get_page(page).get_layer(layer)
            };

            let title_lines = if page.number == 1 { TITLE_LINES } else { 0 };
            let rows = title_lines + page.sections.iter().map(Section::height).sum::<usize>();
            // large budgets shrink the line height to stay on the page.
            let step = ((PAGE_HEIGHT - 2.0 * MARGIN) / rows.max(1) as f32).min(LINE_HEIGHT);
            let mut y = PAGE_HEIGHT - MARGIN;

            if title_lines > 0 {
                layer.use_text(document.title.as_str(), TITLE_SIZE, Mm(MARGIN), Mm(y), &bold);
                y -= step * title_lines as f32;
            }

            for section in &page.sections {
                layer.use_text(section.title.as_str(), FONT_SIZE, Mm(MARGIN), Mm(y), &bold);
                y -= step;
                for line in &section.lines {
                    layer.use_text(
                        format!("{} : {}", line.label, line.value),
                        FONT_SIZE,
                        Mm(MARGIN + INDENT),
                        Mm(y),
                        &regular,
                    );
                    y -= step;
                }
            }

            layer.use_text(
                format!("{}/{total}", page.number),
                FONT_SIZE,
                Mm(PAGE_WIDTH - MARGIN - 10.0),
                Mm(MARGIN / 2.0),
                &regular,
            );
        }

        pdf.save_to_bytes().map_err(RenderError::new)
    }
}

/// Plain-text renderer, one form feed between pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, document: &Document) -> Result<Vec<u8>, RenderError> {
        let mut out = String::new();

        for page in &document.pages {
            if page.number == 1 {
                writeln!(out, "{}\n", document.title).map_err(RenderError::new)?;
            } else {
                out.push('\u{000C}');
            }

            for section in &page.sections {
                writeln!(out, "{} :", section.title).map_err(RenderError::new)?;
                for line in &section.lines {
                    writeln!(out, "  {} : {}", line.label, line.value).map_err(RenderError::new)?;
                }
            }

            writeln!(out, "\n{}/{}", page.number, document.pages.len()).map_err(RenderError::new)?;
        }

        Ok(out.into_bytes())
    }
}
