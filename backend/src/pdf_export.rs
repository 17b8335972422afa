//! Overlay PDF generation and merging onto the base guide template.

use anyhow::{Context, Result, anyhow, bail};
use lopdf::{
    Dictionary, Document, Object, ObjectId, Stream, StringFormat,
    content::{Content, Operation},
    dictionary,
    xref::XrefType,
};
use std::collections::HashMap;

use crate::guide::{self, DrawInstruction, Layout, RenderRequest};
use crate::pdf_metrics::{self, StandardFontMetrics};

/// Resource names of overlay fonts are this prefix plus an index, chosen not
/// to clash with the names template generators use (`F1`, `TT0`, ...).
const FONT_RESOURCE_PREFIX: &str = "GuideF";

/// How deep to follow `Parent` links looking for inherited page resources.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// A single page of positioned text, built up one instruction at a time.
pub struct Overlay {
    page_size: (f32, f32),
    fonts: Vec<String>,
    ops: Vec<Operation>,
}

impl Overlay {
    pub fn new(page_size: (f32, f32)) -> Overlay {
        Overlay {
            page_size,
            fonts: Vec::new(),
            ops: Vec::new(),
        }
    }

    fn font_resource(&mut self, font: &str) -> String {
        let index = match self.fonts.iter().position(|f| f == font) {
            Some(i) => i,
            None => {
                self.fonts.push(font.to_owned());
                self.fonts.len() - 1
            }
        };
        format!("{FONT_RESOURCE_PREFIX}{}", index + 1)
    }

    pub fn draw(&mut self, instruction: &DrawInstruction) {
        let resource = self.font_resource(&instruction.font);
        self.ops.push(Operation::new(
            "Tf",
            vec![resource.as_str().into(), instruction.size.into()],
        ));
        self.ops.push(Operation::new(
            "Tm",
            vec![
                1.0.into(),
                0.0.into(),
                0.0.into(),
                1.0.into(),
                instruction.x.into(),
                instruction.y.into(),
            ],
        ));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(
                pdf_metrics::encode_win_ansi(&instruction.text),
                StringFormat::Literal,
            )],
        ));
    }

    /// Serializes the overlay as a one-page PDF.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.4");
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;

        let id_pages = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for (i, font) in self.fonts.iter().enumerate() {
            let id_font = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.as_str(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(format!("{FONT_RESOURCE_PREFIX}{}", i + 1), id_font);
        }

        let mut operations = Vec::with_capacity(self.ops.len() + 2);
        if !self.ops.is_empty() {
            operations.push(Operation::new("BT", Vec::new()));
            operations.extend(self.ops);
            operations.push(Operation::new("ET", Vec::new()));
        }
        let content = Content { operations };
        let id_content = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("Failed to encode overlay content")?,
        ));

        let id_resources = doc.add_object(dictionary! {
            "Font" => fonts,
        });

        let id_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => id_pages,
            "Contents" => id_content,
            "Resources" => id_resources,
        });

        let (width, height) = self.page_size;
        doc.set_object(
            id_pages,
            dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![id_page.into()],
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            },
        );

        let id_catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => id_pages,
        });
        doc.trailer.set("Root", id_catalog);

        let date = time::OffsetDateTime::now_utc();
        let s_date = format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}Z",
            date.year(),
            u8::from(date.month()),
            date.day(),
            date.hour(),
            date.minute(),
            date.second(),
        );
        let id_info = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(concat!("guia-backend ", env!("CARGO_PKG_VERSION"))),
            "CreationDate" => Object::string_literal(s_date),
        });
        doc.trailer.set("Info", id_info);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}

/// Builds the overlay page for `instructions`.
pub fn build_overlay(instructions: &[DrawInstruction], page_size: (f32, f32)) -> Result<Vec<u8>> {
    let mut overlay = Overlay::new(page_size);
    for instruction in instructions {
        overlay.draw(instruction);
    }
    overlay.finish()
}

/// Copies objects from one document into another, renumbering references.
struct ObjectCopier<'a> {
    source_doc: &'a Document,
    target_doc: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source_doc: &'a Document, target_doc: &'a mut Document) -> Self {
        Self {
            source_doc,
            target_doc,
            id_map: HashMap::new(),
        }
    }

    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        // Reserve the id before recursing so reference cycles terminate.
        let new_id = self.target_doc.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let obj = self.source_doc.get_object(source_id)?.clone();
        let new_obj = self.remap_references(obj)?;
        self.target_doc.objects.insert(new_id, new_obj);
        Ok(new_id)
    }

    fn remap_references(&mut self, obj: Object) -> Result<Object> {
        match obj {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(arr) => Ok(Object::Array(
                arr.into_iter()
                    .map(|o| self.remap_references(o))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.remap_dictionary(dict)?)),
            Object::Stream(mut stream) => {
                stream.dict = self.remap_dictionary(stream.dict)?;
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }

    fn remap_dictionary(&mut self, mut dict: Dictionary) -> Result<Dictionary> {
        for (_, value) in dict.iter_mut() {
            *value = self.remap_references(value.clone())?;
        }
        Ok(dict)
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn first_page(doc: &Document) -> Result<ObjectId> {
    doc.get_pages()
        .into_values()
        .next()
        .ok_or_else(|| anyhow!("PDF has no pages"))
}

/// The resources in effect for `page_id`, following inheritance through the
/// page tree.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut node = page_id;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let dict = doc.get_object(node)?.as_dict()?;
        if let Ok(resources) = dict.get(b"Resources") {
            return Ok(resolve(doc, resources)?.as_dict()?.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => node = *parent,
            _ => return Ok(Dictionary::new()),
        }
    }
    bail!("Page tree is deeper than {MAX_PAGE_TREE_DEPTH} levels")
}

fn font_dictionary(doc: &Document, resources: &Dictionary) -> Result<Dictionary> {
    match resources.get(b"Font") {
        Ok(fonts) => Ok(resolve(doc, fonts)?.as_dict()?.clone()),
        Err(_) => Ok(Dictionary::new()),
    }
}

/// The content streams of a page as a list of references.
fn page_contents(doc: &Document, page: &Dictionary) -> Result<Vec<Object>> {
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    match contents {
        Object::Array(streams) => Ok(streams.clone()),
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(streams) => Ok(streams.clone()),
            _ => Ok(vec![contents.clone()]),
        },
        other => bail!("Unexpected page Contents type {}", other.enum_variant()),
    }
}

/// Stamps page 1 of `overlay` onto page 1 of `base` and returns that page
/// alone; later template pages are dropped.
///
/// The base page content is wrapped in `q`/`Q` so graphics state it leaves
/// behind doesn't leak into the overlay text.
pub fn merge_onto_base_page(base: &[u8], overlay: &[u8]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(base).context("Failed to parse base template")?;
    let overlay_doc = Document::load_mem(overlay).context("Failed to parse overlay")?;

    let base_page = first_page(&doc).context("Base template")?;
    let overlay_page = first_page(&overlay_doc).context("Overlay")?;

    let overlay_content = overlay_doc.get_page_content(overlay_page)?;
    let overlay_fonts = font_dictionary(&overlay_doc, &page_resources(&overlay_doc, overlay_page)?)?;

    let mut resources = page_resources(&doc, base_page)?;
    let mut fonts = font_dictionary(&doc, &resources)?;
    {
        let mut copier = ObjectCopier::new(&overlay_doc, &mut doc);
        for (name, font) in overlay_fonts.iter() {
            if fonts.has(name) {
                bail!(
                    "Base template already defines font resource {}",
                    String::from_utf8_lossy(name)
                );
            }
            fonts.set(name.clone(), copier.remap_references(font.clone())?);
        }
    }
    resources.set("Font", fonts);

    let page = doc.get_object(base_page)?.as_dict()?;
    let mut contents = page_contents(&doc, page)?;

    let id_save = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut tail = b"Q\n".to_vec();
    tail.extend_from_slice(&overlay_content);
    let id_overlay = doc.add_object(Stream::new(dictionary! {}, tail));

    contents.insert(0, id_save.into());
    contents.push(id_overlay.into());

    let page = doc.get_object_mut(base_page)?.as_dict_mut()?;
    page.set("Contents", contents);
    page.set("Resources", resources);

    let later_pages: Vec<u32> = doc.get_pages().into_keys().filter(|&n| n > 1).collect();
    if !later_pages.is_empty() {
        log::debug!("Dropping {} template pages after the first", later_pages.len());
        doc.delete_pages(&later_pages);
        doc.prune_objects();
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Fills `template` with the values of `request` placed by `layout`.
pub fn fill_guide(template: &[u8], request: &RenderRequest, layout: &Layout) -> Result<Vec<u8>> {
    let instructions = guide::compose(request, layout, &StandardFontMetrics);
    log::debug!(
        "Layout {} produced {} draw instructions",
        layout.version,
        instructions.len()
    );
    let overlay = build_overlay(&instructions, layout.page_size)?;
    merge_onto_base_page(template, &overlay)
}
