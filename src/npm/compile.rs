//! Library build (vite) and TypeScript compile helpers

use super::manifest::PackageManifest;
use crate::core::error::PublishError;
use crate::core::traits::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use tokio::fs;

const VITE_TEMPLATE: &str = include_str!("vite.config.template.js");

/// Where the generated vite config is written, relative to the package
pub const GENERATED_CONFIG_DIR: &str = "node_modules/.npm-publish-helper";

/// Library name from a package name: `@scope/my-lib` → `my-lib`
pub fn library_name(package_name: &str) -> Option<String> {
    package_name
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Render the default vite config for `manifest`
pub fn render_vite_config(manifest: &PackageManifest, name: &str) -> Result<String, PublishError> {
    let externals = serde_json::to_string(&manifest.peer_dependency_names())?;
    Ok(VITE_TEMPLATE
        .replace("<externals>", &externals)
        .replace("<entry>", manifest.main().unwrap_or("index.ts"))
        .replace("<name>", name))
}

/// Use the package's own `vite.config.js` or write the generated one
async fn resolve_vite_config(
    dir: &Path,
    manifest: &PackageManifest,
    name: &str,
) -> Result<PathBuf, PublishError> {
    let own = dir.join("vite.config.js");
    if own.exists() {
        return Ok(own);
    }

    let target_dir = dir.join(GENERATED_CONFIG_DIR);
    fs::create_dir_all(&target_dir).await?;
    let path = target_dir.join("vite.config.js");
    fs::write(&path, render_vite_config(manifest, name)?).await?;
    log::debug!("Wrote default vite config to {}", path.display());
    Ok(path)
}

/// `compile-library`: bundle the package with vite into `dist/`
pub async fn compile_library(
    runner: &dyn CommandRunner,
    dir: &Path,
    library: Option<&str>,
) -> Result<(), PublishError> {
    let manifest = PackageManifest::load(dir).await?;
    let name = match library.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => name.to_string(),
        None => library_name(manifest.require_name()?).ok_or_else(|| {
            PublishError::Config("library name could not be derived from the package name".to_string())
        })?,
    };
    log::info!("Building library {}", name);

    let config = resolve_vite_config(dir, &manifest, &name).await?;
    let spec = CommandSpec::new("npx", dir)
        .args(["vite", "build", "--base=./", "--outDir=dist"])
        .arg(format!("--config={}", config.display()))
        .inherit_output();
    run_checked(runner, spec).await?;

    log::info!("Built library {}", name);
    Ok(())
}

/// `compile`: emit TypeScript output into `lib/`
pub async fn compile_typescript(runner: &dyn CommandRunner, dir: &Path) -> Result<(), PublishError> {
    log::info!("Compiling TypeScript");
    let spec = CommandSpec::new("npx", dir)
        .args(["tsc", "--rootDir", ".", "--outDir", "lib"])
        .args(["--noEmit", "false", "--incremental", "false", "--skipLibCheck"])
        .inherit_output();
    run_checked(runner, spec).await?;
    log::info!("Compiled TypeScript");
    Ok(())
}

async fn run_checked(runner: &dyn CommandRunner, spec: CommandSpec) -> Result<(), PublishError> {
    log::info!("{}", spec);
    let result = runner
        .run(&spec)
        .await
        .map_err(|e| PublishError::CommandFailed {
            command: spec.to_string(),
            message: e.to_string(),
        })?;
    if !result.is_success() {
        return Err(PublishError::CommandFailed {
            command: spec.to_string(),
            message: match result.combined_output() {
                output if output.is_empty() => "exited with a non-zero status".to_string(),
                output => output,
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRunner;
    use tempfile::TempDir;

    fn package(dir: &Path, json: &str) {
        std::fs::write(dir.join("package.json"), json).unwrap();
    }

    #[test]
    fn test_library_name() {
        assert_eq!(library_name("@needle/engine-lib").as_deref(), Some("engine-lib"));
        assert_eq!(library_name("plain").as_deref(), Some("plain"));
        assert_eq!(library_name("@scope/"), None);
    }

    #[tokio::test]
    async fn test_render_uses_main_and_peer_dependencies() {
        let dir = TempDir::new().unwrap();
        package(
            dir.path(),
            r#"{"name": "lib", "main": "src/index.ts", "peerDependencies": {"three": "*", "react": "^18"}}"#,
        );
        let manifest = PackageManifest::load(dir.path()).await.unwrap();
        let config = render_vite_config(&manifest, "lib").unwrap();

        assert!(config.contains(r#"entry: "src/index.ts""#));
        assert!(config.contains(r#"const external = ["three","react"];"#));
        assert!(config.contains(r#""lib.umd.cjs""#));
        assert!(!config.contains("<name>"));
    }

    #[tokio::test]
    async fn test_compile_library_generates_config() {
        let dir = TempDir::new().unwrap();
        package(dir.path(), r#"{"name": "@scope/widgets", "version": "1.0.0"}"#);
        let runner = FakeRunner::new();

        compile_library(&runner, dir.path(), None).await.unwrap();

        let generated = dir.path().join(GENERATED_CONFIG_DIR).join("vite.config.js");
        let text = std::fs::read_to_string(&generated).unwrap();
        assert!(text.contains(r#"entry: "index.ts""#));
        assert!(text.contains(r#"name: "widgets""#));

        let calls = runner.calls();
        assert_eq!(calls[0].program, "npx");
        assert!(calls[0].inherit_output);
        assert_eq!(
            calls[0].args.last().unwrap(),
            &format!("--config={}", generated.display())
        );
    }

    #[tokio::test]
    async fn test_compile_library_prefers_existing_config() {
        let dir = TempDir::new().unwrap();
        package(dir.path(), r#"{"name": "widgets"}"#);
        std::fs::write(dir.path().join("vite.config.js"), "export default {}").unwrap();
        let runner = FakeRunner::new();

        compile_library(&runner, dir.path(), Some("custom")).await.unwrap();

        assert!(!dir.path().join(GENERATED_CONFIG_DIR).exists());
        assert!(runner.commands()[0].ends_with("vite.config.js"));
    }

    #[tokio::test]
    async fn test_compile_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new().respond("npx tsc", FakeRunner::fail(""));
        let result = compile_typescript(&runner, dir.path()).await;
        assert!(matches!(result, Err(PublishError::CommandFailed { .. })));
        assert_eq!(
            runner.commands()[0],
            "npx tsc --rootDir . --outDir lib --noEmit false --incremental false --skipLibCheck"
        );
    }
}
