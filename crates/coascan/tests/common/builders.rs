//! Fixture builders.

#![allow(dead_code)]

use std::time::Duration;

use coascan::DispatcherSettings;
use lopdf::{dictionary, Document, Object, Stream};

/// COA text with a lot number and a report date but no lab or ingredient.
pub const LOT_AND_DATE_ONLY: &str = "Certificate of Analysis\nLot: ABC-123\nReport Date: 2024-01-01\n";

/// COA text carrying every recognised field.
pub const COMPLETE_COA: &str = "Certificate of Analysis\n\
Ingredient: Ashwagandha Root Extract\n\
Batch #: AW-2024-117\n\
Laboratory: Eurofins Scientific\n\
Report Date: 2024-03-15\n";

/// Single-page PDF with one text object per line, Courier 12pt.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let content: String = lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("BT /F1 12 Tf 50 {} Td ({}) Tj ET\n", 740 - i * 16, line))
        .collect();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

/// Builder for dispatcher settings used in queue tests.
pub struct SettingsBuilder {
    settings: DispatcherSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: DispatcherSettings::default(),
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.settings.max_attempts = n;
        self
    }

    pub fn batch_size(mut self, n: u32) -> Self {
        self.settings.default_batch_size = n;
        self
    }

    pub fn lease(mut self, lease: Duration) -> Self {
        self.settings.lease = lease;
        self
    }

    pub fn budget(mut self, budget: Duration) -> Self {
        self.settings.budget = budget;
        self
    }

    pub fn build(self) -> DispatcherSettings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
