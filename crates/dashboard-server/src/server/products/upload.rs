//! Multipart product forms with an optional image.
//!
//! Images land in `<image_dir>/product/` and are referenced as
//! `/image/product/<file>`, the path the router serves them from.

use super::model::{NewProduct, ProductPatch};
use crate::server::{config::ServerConfig, error::AppError};
use axum::extract::Multipart;
use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

const IMAGE_FIELD: &str = "foto";
const PUBLIC_PREFIX: &str = "/image/";
const PRODUCT_DIR: &str = "product";

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// An image written to disk for the current request.
#[derive(Debug)]
pub struct StoredImage {
    pub url: String,
    path: PathBuf,
}

/// Text fields of a product form plus its stored image, if one was sent.
#[derive(Debug, Default)]
pub struct ProductForm {
    fields: HashMap<String, String>,
    pub image: Option<StoredImage>,
}

impl ProductForm {
    /// Reads every part, storing the image as soon as it has been checked.
    pub async fn read(mut multipart: Multipart, config: &ServerConfig) -> Result<Self, AppError> {
        let mut form = Self::default();
        let result = form.read_parts(&mut multipart, config).await;
        if let Err(err) = result {
            form.discard_image().await;
            return Err(err);
        }
        Ok(form)
    }

    async fn read_parts(
        &mut self,
        multipart: &mut Multipart,
        config: &ServerConfig,
    ) -> Result<(), AppError> {
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if name != IMAGE_FIELD || field.file_name().is_none() {
                self.fields.insert(name, field.text().await?);
                continue;
            }
            if self.image.is_some() {
                return Err(AppError::Validation("Only one image may be uploaded".to_owned()));
            }
            let extension = field
                .content_type()
                .and_then(extension_for)
                .ok_or_else(|| AppError::Validation("Only image files are allowed".to_owned()))?;
            let bytes = field.bytes().await?;
            if bytes.len() > config.upload_max_bytes {
                return Err(AppError::Validation(format!(
                    "File too large. Maximum size is {}MB.",
                    config.upload_max_bytes.div_ceil(1024 * 1024)
                )));
            }
            self.image = Some(store_image(config, extension, &bytes).await?);
        }
        Ok(())
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn price(&self) -> Result<Option<f64>, AppError> {
        self.text("price")
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| AppError::Validation("price must be a number".to_owned()))
            })
            .transpose()
    }

    fn foto(&self) -> Option<String> {
        self.image.as_ref().map(|image| image.url.clone())
    }

    pub fn new_product(&self) -> Result<NewProduct, AppError> {
        let product = NewProduct {
            name: self.text("name").unwrap_or_default().to_owned(),
            category_name: self.text("category_name").unwrap_or_default().to_owned(),
            price: self
                .price()?
                .ok_or_else(|| AppError::Validation("price is required".to_owned()))?,
            foto: self.foto(),
        };
        product.validate()?;
        Ok(product)
    }

    pub fn patch(&self) -> Result<ProductPatch, AppError> {
        let patch = ProductPatch {
            name: self.text("name").map(str::to_owned),
            category_name: self.text("category_name").map(str::to_owned),
            price: self.price()?,
            foto: self.foto(),
        };
        patch.validate()?;
        Ok(patch)
    }

    /// Removes the stored image, used when the request fails after upload.
    pub async fn discard_image(&mut self) {
        if let Some(image) = self.image.take() {
            remove_file(&image.path).await;
        }
    }
}

async fn store_image(
    config: &ServerConfig,
    extension: &str,
    bytes: &[u8],
) -> Result<StoredImage, AppError> {
    let dir = Path::new(&config.image_dir).join(PRODUCT_DIR);
    let file = format!(
        "img-{}-{}.{extension}",
        chrono::Utc::now().timestamp_millis(),
        UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let path = dir.join(&file);

    let failed = |err: std::io::Error| AppError::Internal(format!("storing upload failed: {err}"));
    tokio::fs::create_dir_all(&dir).await.map_err(failed)?;
    tokio::fs::write(&path, bytes).await.map_err(failed)?;

    tracing::debug!(path = %path.display(), size = bytes.len(), "Image stored");
    Ok(StoredImage {
        url: format!("{PUBLIC_PREFIX}{PRODUCT_DIR}/{file}"),
        path,
    })
}

/// Maps a public image URL back to its file, refusing anything that would
/// leave the image directory.
fn local_path(config: &ServerConfig, url: &str) -> Option<PathBuf> {
    let relative = Path::new(url.strip_prefix(PUBLIC_PREFIX)?);
    if relative
        .components()
        .all(|part| matches!(part, Component::Normal(_)))
    {
        Some(Path::new(&config.image_dir).join(relative))
    } else {
        None
    }
}

/// Deletes the file behind a stored image URL. Missing files are ignored.
pub async fn remove_image(config: &ServerConfig, url: &str) {
    match local_path(config, url) {
        Some(path) => remove_file(&path).await,
        None => tracing::warn!(url, "Refusing to delete image outside the image directory"),
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Image deleted"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Image delete failed"),
    }
}
