mod archive;
mod autofit;
mod batch;
mod error;
mod font;
mod overlay;
mod raster;
mod render;
mod template;
mod types;
mod units;

pub use archive::{archive_entries, sanitize_component, write_zip};
pub use autofit::{FitResult, MIN_FONT_SIZE, fit};
pub use batch::{
    BatchEntry, BatchOptions, BatchResult, GroupSpec, Outcome, render_batch,
};
pub use error::LaurelError;
pub use font::{FontOrigin, FontResource, MetricsSource, TextMeasure, TextSize};
pub use overlay::VectorOverlay;
pub use raster::RasterComposite;
pub use render::{NameRenderer, PlacementSpec};
pub use template::TemplatePage;
pub use types::{Cm, Color, PageGeometry, Pt};
pub use units::{CM_PER_INCH, POINTS_PER_CM, cm_to_pixels, cm_to_points, pt_to_px};

#[cfg(test)]
pub(crate) mod testutil {
    use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

    pub(crate) fn single_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = add_text_page(&mut doc, pages_id, text);
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(page_id)],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        finish(doc, pages_id)
    }

    pub(crate) fn two_page_pdf(first: &str, second: &str) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let first_id = add_text_page(&mut doc, pages_id, first);
        let second_id = add_text_page(&mut doc, pages_id, second);
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(first_id), LoObject::Reference(second_id)],
            "Count" => 2,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        finish(doc, pages_id)
    }

    fn add_text_page(
        doc: &mut LoDocument,
        pages_id: lopdf::ObjectId,
        text: &str,
    ) -> lopdf::ObjectId {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        })
    }

    fn finish(mut doc: LoDocument, pages_id: lopdf::ObjectId) -> Vec<u8> {
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save fixture pdf");
        out
    }
}
