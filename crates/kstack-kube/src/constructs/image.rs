//! Container images built and pushed before deploy

use kstack_core::{CommandRunner, DockerImage};
use std::sync::Arc;

use crate::chart::Construct;
use crate::hooks::{HookClass, HookPhase, HookTable};

/// Builds then pushes an image in its `pre:deploy` hook
///
/// Emits no objects; pod specs reference [`ImageBuild::name_tag`].
pub struct ImageBuild {
    id: String,
    image: DockerImage,
    hooks: HookTable,
}

impl ImageBuild {
    pub fn new(id: impl Into<String>, image: DockerImage, runner: Arc<dyn CommandRunner>) -> Self {
        let mut hooks = HookTable::new();
        let hook_image = image.clone();
        hooks.add(HookPhase::PreDeploy, move || {
            let image = hook_image.clone();
            let runner = Arc::clone(&runner);
            async move {
                image.build(runner.as_ref()).await?;
                image.push(runner.as_ref()).await?;
                Ok(())
            }
        });

        Self {
            id: id.into(),
            image,
            hooks,
        }
    }

    pub fn image(&self) -> &DockerImage {
        &self.image
    }

    pub fn name_tag(&self) -> String {
        self.image.name_tag()
    }
}

impl Construct for ImageBuild {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "ImageBuild"
    }

    fn hooks(&self) -> Option<&HookTable> {
        Some(&self.hooks)
    }

    fn hook_class(&self) -> HookClass {
        HookClass::ImageBuild
    }
}
