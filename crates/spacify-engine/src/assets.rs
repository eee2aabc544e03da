use std::path::{Path, PathBuf};

/// Maps catalog image references onto files under the frontend tree.
#[derive(Debug, Clone)]
pub struct FurnitureAssets {
    root: PathBuf,
}

impl FurnitureAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `/x.png` and bare names live under `public/`; `src/assets/...` is
    /// relative to the root itself.
    pub fn resolve(&self, image_ref: &str) -> PathBuf {
        let trimmed = image_ref.trim();
        if trimmed.starts_with("src/assets/") {
            return self.root.join(trimmed);
        }
        self.root
            .join("public")
            .join(trimmed.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::FurnitureAssets;

    #[test]
    fn references_resolve_like_the_frontend_bundle() {
        let assets = FurnitureAssets::new("/app/frontend");
        assert_eq!(
            assets.resolve("/lovable-uploads/sofa.png"),
            PathBuf::from("/app/frontend/public/lovable-uploads/sofa.png")
        );
        assert_eq!(
            assets.resolve("src/assets/furniture/desk.png"),
            PathBuf::from("/app/frontend/src/assets/furniture/desk.png")
        );
        assert_eq!(
            assets.resolve("lamp.png"),
            PathBuf::from("/app/frontend/public/lamp.png")
        );
    }
}
