use super::{CompositionContext, Phase};
use crate::error::{ModulithError, Result};
use crate::module::{Module, ModuleDescriptor};
use crate::web::{ApplicationContext, WebModule};

async fn call_hook(
    module: &dyn Module,
    phase: Phase,
    ctx: &mut CompositionContext,
) -> anyhow::Result<()> {
    match phase {
        Phase::PreConfigure => module.pre_configure_services(ctx).await,
        Phase::Configure => module.configure_services(ctx).await,
        Phase::PostConfigure => module.post_configure_services(ctx).await,
        Phase::Initialize => module.on_initialize(ctx).await,
        Phase::PostInitialize => module.on_post_initialize(ctx).await,
        Phase::Shutdown => module.on_shutdown(ctx).await,
        Phase::PreApplication | Phase::Application | Phase::PostApplication => Ok(()),
    }
}

async fn call_web_hook(
    module: &dyn WebModule,
    phase: Phase,
    ctx: &mut ApplicationContext,
) -> anyhow::Result<()> {
    match phase {
        Phase::PreApplication => module.on_pre_application(ctx).await,
        Phase::Application => module.on_application(ctx).await,
        Phase::PostApplication => module.on_post_application(ctx).await,
        _ => Ok(()),
    }
}

/// Runs module hooks phase by phase over a dependency-ordered module list.
///
/// Every module completes a phase before any module enters the next one.
/// Within a phase, modules are called in sequence order, so a module always
/// runs after its dependencies.
///
/// ```text
/// PreConfigure   → [Core, Data, Api]
/// Configure      → [Core, Data, Api]   (declared registrations applied first)
/// PostConfigure  → [Core, Data, Api]
///       ↓ registry frozen, container built
/// Initialize     → [Core, Data, Api]
/// PostInitialize → [Core, Data, Api]
///       ↓ finalized
/// PreApplication / Application / PostApplication → web-capable modules only
/// Shutdown       → [Api, Data, Core]
/// ```
pub struct LifecycleOrchestrator {
    modules: Vec<ModuleDescriptor>,
}

impl LifecycleOrchestrator {
    /// `modules` must already be in dependency order, see [`sequence`](crate::module::sequence)
    pub fn new(modules: Vec<ModuleDescriptor>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Run the five baseline phases.
    ///
    /// The first failing hook aborts the run with
    /// [`ModulithError::ModuleLifecycle`]; hooks that already ran are not
    /// undone.
    pub async fn run(&self, ctx: &mut CompositionContext) -> Result<()> {
        tracing::info!("Running lifecycle for {} modules...", self.modules.len());

        for phase in Phase::BASELINE {
            ctx.enter_phase(Some(phase));
            tracing::info!("Calling {} hooks...", phase);

            for descriptor in &self.modules {
                if phase == Phase::Configure && !descriptor.registrations().is_empty() {
                    tracing::debug!(
                        "Registering {} declared services of {}",
                        descriptor.registrations().len(),
                        descriptor.name()
                    );
                    ctx.services()?
                        .extend(descriptor.registrations().iter().cloned());
                }

                tracing::debug!("{}: {}", phase, descriptor.name());
                call_hook(descriptor.instance().as_ref(), phase, ctx)
                    .await
                    .map_err(|e| {
                        tracing::error!("{} failed for {}: {}", phase, descriptor.name(), e);
                        ModulithError::lifecycle(phase, descriptor.name(), e)
                    })?;
            }

            if phase == Phase::PostConfigure {
                let container = ctx.freeze();
                tracing::info!("Service registry frozen ({} service types)", container.len());
            }

            tracing::info!("{} complete ({} modules)", phase, self.modules.len());
        }

        ctx.enter_phase(None);
        ctx.finalize();
        Ok(())
    }

    /// Run the web phases for web-capable modules only.
    ///
    /// Callers are expected to do this at most once per application, after
    /// [`run`](Self::run) has finalized the context.
    pub async fn run_web(&self, ctx: &mut ApplicationContext) -> Result<()> {
        let web_modules: Vec<(&ModuleDescriptor, &dyn WebModule)> = self
            .modules
            .iter()
            .filter_map(|descriptor| descriptor.web().map(|web| (descriptor, web)))
            .collect();

        tracing::info!(
            "Running web lifecycle for {} of {} modules...",
            web_modules.len(),
            self.modules.len()
        );

        for phase in Phase::WEB {
            for (descriptor, web) in &web_modules {
                tracing::debug!("{}: {}", phase, descriptor.name());
                call_web_hook(*web, phase, ctx).await.map_err(|e| {
                    tracing::error!("{} failed for {}: {}", phase, descriptor.name(), e);
                    ModulithError::lifecycle(phase, descriptor.name(), e)
                })?;
            }
            tracing::info!("{} complete ({} modules)", phase, web_modules.len());
        }
        Ok(())
    }

    /// Call every `on_shutdown` hook in reverse sequence order.
    ///
    /// A failing hook is logged and the remaining hooks still run; the first
    /// failure is returned once all of them have been called.
    pub async fn shutdown(&self, ctx: &mut CompositionContext) -> Result<()> {
        tracing::info!("Calling Shutdown hooks...");
        ctx.enter_phase(Some(Phase::Shutdown));

        let mut first_error = None;
        for descriptor in self.modules.iter().rev() {
            tracing::debug!("Shutting down: {}", descriptor.name());
            if let Err(e) = call_hook(descriptor.instance().as_ref(), Phase::Shutdown, ctx).await {
                tracing::error!("Shutdown failed for {}: {}", descriptor.name(), e);
                first_error.get_or_insert_with(|| {
                    ModulithError::lifecycle(Phase::Shutdown, descriptor.name(), e)
                });
            }
        }

        ctx.enter_phase(None);
        tracing::info!("Shutdown complete ({} modules)", self.modules.len());
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|d| d.name()))
            .finish()
    }
}
