//! Object naming for uploaded files.

use regex::Regex;
use std::sync::LazyLock;

/// Bucket holding scanner images.
pub const IMAGES_BUCKET: &str = "images";

/// Bucket holding species illustrations.
pub const SPECIES_ILLUSTRATIONS_BUCKET: &str = "species_illustrations";

/// Bucket holding single-cell expression counts.
pub const SCRNA_BUCKET: &str = "scrna";

/// Object store key for `path` inside `bucket`.
pub fn object_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path.trim_start_matches('/'))
}

/// Sanitize an uploaded counts file name for use in a storage path.
pub fn clean_filename(filename: &str) -> String {
    static WHITESPACE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    static FORBIDDEN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[<>:"|?*\\%]"#).expect("valid regex"));

    let trimmed = filename.trim().trim_start_matches('\\');
    let underscored = WHITESPACE.replace_all(trimmed, "_");
    let cleaned = FORBIDDEN.replace_all(&underscored, "");
    cleaned
        .strip_suffix(".json")
        .unwrap_or(&cleaned)
        .to_string()
}

/// Replace runs of path-hostile characters or whitespace in a gene name with `_`.
pub fn clean_gene_name(gene_name: &str) -> String {
    static HOSTILE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[/:*?"<>|\\\s]+"#).expect("valid regex"));
    HOSTILE.replace_all(gene_name, "_").into_owned()
}

/// Path (inside [`SCRNA_BUCKET`]) of one gene's counts.
pub fn counts_object_path(filename: &str, dataset_id: i64, gene_name: &str) -> String {
    format!(
        "counts/{}_{}_/{}.json",
        clean_filename(filename),
        dataset_id,
        clean_gene_name(gene_name)
    )
}

/// Path (inside [`SPECIES_ILLUSTRATIONS_BUCKET`]) of a species illustration.
pub fn species_illustration_path(id: &str) -> String {
    format!("species/species_{id}.png")
}

/// Path (inside [`IMAGES_BUCKET`]) of a scanner image.
pub fn cyl_image_path(image_id: i64) -> String {
    format!("cyl-images/{image_id}.png")
}
