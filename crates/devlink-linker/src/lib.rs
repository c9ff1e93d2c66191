mod cleanup;
mod cycle;
mod interrupt;
mod resolver;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use devlink_core::{PackagePathIndex, Result};
use devlink_project::{PackageIndexCache, ProjectLayout};

pub use cleanup::remove_local_package_links;
pub use cycle::{
    run_post_resolve, CycleOutcome, CyclePhase, LinkReport, ManifestSnapshot, ResolverStatus,
    RestoreGuard,
};
pub use interrupt::InterruptFlag;
pub use resolver::{ProcessExecutor, ProcessOutput, ResolverCommand, SystemProcessExecutor};

/// Host lifecycle points. Install and update each have a pre and a post
/// variant; the pre variants clean up, the post variants link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    PreInstallCmd,
    PreUpdateCmd,
    PostInstallCmd,
    PostUpdateCmd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHandler {
    PreResolve,
    PostResolve,
}

impl HostEvent {
    pub const ALL: [HostEvent; 4] = [
        Self::PreInstallCmd,
        Self::PreUpdateCmd,
        Self::PostInstallCmd,
        Self::PostUpdateCmd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreInstallCmd => "pre-install-cmd",
            Self::PreUpdateCmd => "pre-update-cmd",
            Self::PostInstallCmd => "post-install-cmd",
            Self::PostUpdateCmd => "post-update-cmd",
        }
    }

    pub fn handler(self) -> LifecycleHandler {
        match self {
            Self::PreInstallCmd | Self::PreUpdateCmd => LifecycleHandler::PreResolve,
            Self::PostInstallCmd | Self::PostUpdateCmd => LifecycleHandler::PostResolve,
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostEvent {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == value)
            .ok_or_else(|| {
                let known = Self::ALL.map(HostEvent::as_str).join(", ");
                format!("unknown host event '{value}' (expected one of: {known})")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Cleaned { removed: Vec<PathBuf> },
    Cycle(CycleOutcome),
}

/// Entry points for one invocation. Discovery runs at most once and is
/// shared by every handler called on the same value.
#[derive(Debug)]
pub struct DevLinker<E> {
    layout: ProjectLayout,
    resolver_program: String,
    executor: E,
    cache: PackageIndexCache,
    interrupt: InterruptFlag,
}

impl<E: ProcessExecutor> DevLinker<E> {
    pub fn new(layout: ProjectLayout, resolver_program: impl Into<String>, executor: E) -> Self {
        Self {
            layout,
            resolver_program: resolver_program.into(),
            executor,
            cache: PackageIndexCache::new(),
            interrupt: InterruptFlag::new(),
        }
    }

    /// Shares `interrupt` with whoever raises it, usually a signal handler.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn resolver_program(&self) -> &str {
        &self.resolver_program
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn packages(&mut self) -> Result<&PackagePathIndex> {
        self.cache.get_or_discover(&self.layout)
    }

    pub fn discovery_scans(&self) -> usize {
        self.cache.scan_count()
    }

    pub fn pre_resolve(&mut self) -> Result<Vec<PathBuf>> {
        let index = self.cache.get_or_discover(&self.layout)?;
        remove_local_package_links(index, &self.layout)
    }

    pub fn post_resolve(&mut self) -> Result<CycleOutcome> {
        let index = self.cache.get_or_discover(&self.layout)?;
        run_post_resolve(
            &self.layout,
            index,
            &self.resolver_program,
            &mut self.executor,
            &self.interrupt,
        )
    }

    pub fn handle(&mut self, event: HostEvent) -> Result<HandlerOutcome> {
        match event.handler() {
            LifecycleHandler::PreResolve => Ok(HandlerOutcome::Cleaned {
                removed: self.pre_resolve()?,
            }),
            LifecycleHandler::PostResolve => Ok(HandlerOutcome::Cycle(self.post_resolve()?)),
        }
    }
}

#[cfg(test)]
mod tests;
