//! Validation des pièces jointes (images et PDF) avant stockage.
//!
//! Le coeur ne conserve qu'une référence opaque vers le fichier; ce module
//! garantit qu'un contenu accepté respecte la taille maximale, qu'il porte
//! un nom sans composant de chemin, et que son contenu correspond bien à
//! son extension.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::ImageReader;
use std::io::Cursor;

/// Taille maximale d'une pièce jointe (5 Mo)
const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Dimensions maximales d'une image jointe
const MAX_IMAGE_DIMENSIONS: (u32, u32) = (4096, 4096);

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Une pièce jointe validée, prête à être écrite dans le dossier d'upload
#[derive(Debug, Clone)]
pub struct FileInput {
    content: Vec<u8>,
    filename: String,
}

impl FileInput {
    pub fn new(content: &[u8], filename: &str) -> Result<Self> {
        if content.is_empty() {
            bail!("File content cannot be empty");
        }
        if content.len() > MAX_FILE_SIZE {
            bail!(
                "File size exceeds maximum allowed size of {} bytes",
                MAX_FILE_SIZE
            );
        }

        let filename = Self::sanitize_filename(filename)?;
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| anyhow!("File must have an extension"))?;

        match extension.as_str() {
            "pdf" => Self::validate_pdf(content)?,
            ext if IMAGE_EXTENSIONS.contains(&ext) => Self::validate_image(content)?,
            _ => bail!("File must be a .jpg, .jpeg, .png or .pdf"),
        }

        Ok(Self {
            content: content.to_vec(),
            filename,
        })
    }

    /// Retire tout composant de chemin du nom de fichier
    fn sanitize_filename(filename: &str) -> Result<String> {
        let filename = filename.trim();
        if filename.is_empty() {
            bail!("Filename cannot be empty");
        }

        Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .ok_or_else(|| anyhow!("Invalid filename"))
    }

    fn validate_pdf(content: &[u8]) -> Result<()> {
        if !content.starts_with(b"%PDF-") {
            bail!("File does not look like a PDF document");
        }
        Ok(())
    }

    /// Décode l'image pour vérifier son intégrité et ses dimensions
    fn validate_image(content: &[u8]) -> Result<()> {
        let image = ImageReader::new(Cursor::new(content))
            .with_guessed_format()
            .context("Failed to read image header")?
            .decode()
            .context("Failed to decode image")?;

        let (width, height) = (image.width(), image.height());
        if width > MAX_IMAGE_DIMENSIONS.0 || height > MAX_IMAGE_DIMENSIONS.1 {
            bail!("Image dimensions exceed maximum of {:?}", MAX_IMAGE_DIMENSIONS);
        }
        Ok(())
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}
