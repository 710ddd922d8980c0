//! Containerfile rendering.
//!
//! One Containerfile per image: scratch stages exposing each layer's
//! recipe files, an optional supervisord fragment stage, a bootstrap
//! preamble for images sitting directly on an external base, and one
//! install block per layer, ordered by the fleet-wide layer order.

use std::collections::{BTreeMap, BTreeSet};

use stratum_core::error::Result;

use crate::config::PkgFamily;
use crate::image::{layers_provided_by_image, ResolvedImage};
use crate::layer::{resolve_layer_order, Layer};

/// Render the Containerfile for a single image.
///
/// `global_order` is the fleet-wide layer order; the image's install
/// steps follow it so every image's layer list is a subsequence of the
/// same sequence.
pub fn render_containerfile(
    img: &ResolvedImage,
    images: &BTreeMap<String, ResolvedImage>,
    layers: &BTreeMap<String, Layer>,
    global_order: &[String],
) -> Result<String> {
    let mut b = String::new();

    b.push_str(&format!(
        "# .build/{}/Containerfile (generated -- do not edit)\n\n",
        img.name
    ));

    // Layers already provided by an internal base are excluded here; the
    // base image installed them.
    let parent_layers: Option<BTreeSet<String>> = if img.is_external_base {
        None
    } else {
        Some(layers_provided_by_image(&img.base, images, layers)?)
    };
    let resolved = resolve_layer_order(&img.layers, layers, parent_layers.as_ref())?;
    let layer_order = project_onto(global_order, resolved);

    // Scratch stages make each layer's files bind-mountable by name.
    for layer_name in &layer_order {
        b.push_str(&format!("FROM scratch AS {layer_name}\n"));
        b.push_str(&format!("COPY layers/{layer_name}/ /\n\n"));
    }

    let has_services = layer_order
        .iter()
        .any(|name| layers[name].has_supervisord);

    if has_services {
        b.push_str("FROM scratch AS supervisord-conf\n");
        b.push_str("COPY templates/supervisord.header.conf /fragments/00-header.conf\n");
        for (i, layer_name) in layer_order.iter().enumerate() {
            if layers[layer_name].has_supervisord {
                b.push_str(&format!(
                    "COPY layers/{layer_name}/supervisord.conf /fragments/{:02}-{layer_name}.conf\n",
                    i + 1
                ));
            }
        }
        b.push('\n');
    }

    let resolved_base = if img.is_external_base {
        img.base.clone()
    } else {
        images[&img.base].full_tag.clone()
    };
    b.push_str(&format!("ARG BASE_IMAGE={resolved_base}\n"));
    b.push_str("FROM ${BASE_IMAGE}\n\n");

    if img.is_external_base {
        write_bootstrap(&mut b, img);
    }

    for layer_name in &layer_order {
        write_layer_steps(&mut b, &layers[layer_name], img);
    }

    if has_services {
        b.push_str("# Assemble supervisord.conf\n");
        b.push_str("RUN --mount=type=bind,from=supervisord-conf,source=/fragments,target=/fragments \\\n");
        b.push_str("    cat /fragments/*.conf > /etc/supervisord.conf\n\n");
    }

    b.push_str(&format!("USER {}\n", img.user));

    if img.bootc {
        b.push_str("\nRUN bootc container lint\n");
    }

    Ok(b)
}

/// Re-sort a resolved layer list by the global order. Falls back to the
/// dependency order when the global order does not cover every layer.
fn project_onto(global_order: &[String], resolved: Vec<String>) -> Vec<String> {
    let needed: BTreeSet<&str> = resolved.iter().map(String::as_str).collect();
    let projected: Vec<String> = global_order
        .iter()
        .filter(|layer| needed.contains(layer.as_str()))
        .cloned()
        .collect();
    if projected.len() == resolved.len() {
        projected
    } else {
        resolved
    }
}

/// Bootstrap preamble: install the task runner, create the image user,
/// and set up the user environment. Only images sitting directly on an
/// external base need this; internal bases inherit it.
fn write_bootstrap(b: &mut String, img: &ResolvedImage) {
    b.push_str("# Bootstrap\n");

    b.push_str("RUN ");
    match img.pkg {
        PkgFamily::Deb => {
            b.push_str("--mount=type=cache,dst=/var/cache/apt,sharing=locked \\\n");
            b.push_str("    --mount=type=cache,dst=/var/lib/apt,sharing=locked \\\n    ");
        }
        PkgFamily::Rpm => {
            b.push_str("--mount=type=cache,dst=/var/cache/libdnf5,sharing=locked \\\n    ");
        }
    }
    b.push_str("ARCH=$(uname -m) && \\\n");
    b.push_str("    case \"$ARCH\" in x86_64) ARCH=amd64;; aarch64) ARCH=arm64;; esac && \\\n");
    b.push_str("    curl -fsSL \"https://github.com/go-task/task/releases/latest/download/task_linux_${ARCH}.tar.gz\" | tar -xzf - -C /usr/local/bin task\n\n");

    b.push_str(&format!(
        "RUN id -u {user} >/dev/null 2>&1 || useradd -m -u {uid} -s /bin/bash {user}\n\n",
        user = img.user,
        uid = img.uid
    ));

    b.push_str(&format!(
        "ENV NPM_CONFIG_PREFIX=\"{home}/.npm-global\"\n",
        home = img.home
    ));
    b.push_str(&format!(
        "ENV npm_config_cache=\"{home}/.cache/npm\"\n",
        home = img.home
    ));
    b.push_str(&format!(
        "ENV PATH=\"{home}/.npm-global/bin:{home}/.cargo/bin:{home}/.pixi/envs/default/bin:${{PATH}}\"\n",
        home = img.home
    ));
    b.push_str(&format!("WORKDIR {}\n\n", img.home));
}

/// Install steps for one layer: native packages and the root manifest as
/// root, then the language-ecosystem manifests as the image user.
fn write_layer_steps(b: &mut String, layer: &Layer, img: &ResolvedImage) {
    b.push_str(&format!("# Layer: {}\n", layer.name));

    let mut as_user = false;

    match img.pkg {
        PkgFamily::Rpm if layer.has_rpm_list => {
            if !layer.rpm_packages.is_empty() {
                write_dnf_install(b, &layer.rpm_packages, &layer.copr_repos);
            }
        }
        PkgFamily::Deb if layer.has_deb_list => {
            if !layer.deb_packages.is_empty() {
                write_apt_install(b, &layer.deb_packages);
            }
        }
        _ => {}
    }

    if layer.has_root_yml {
        write_root_yml(b, &layer.name, img.pkg);
    }

    if layer.has_pixi_toml {
        switch_to_user(b, &mut as_user, img);
        b.push_str(&format!(
            "RUN --mount=type=bind,from={name},source=/,target=/ctx \\\n",
            name = layer.name
        ));
        b.push_str(&format!(
            "    --mount=type=cache,dst={home}/.cache/rattler,uid={uid},gid={gid} \\\n",
            home = img.home,
            uid = img.uid,
            gid = img.gid
        ));
        b.push_str(&format!(
            "    cd {home} && pixi add --manifest-path /ctx/pixi.toml\n",
            home = img.home
        ));
    }

    if layer.has_package_json {
        switch_to_user(b, &mut as_user, img);
        b.push_str(&format!(
            "RUN --mount=type=bind,from={name},source=/,target=/ctx \\\n",
            name = layer.name
        ));
        b.push_str(&format!(
            "    --mount=type=cache,dst={home}/.cache/npm,uid={uid},gid={gid} \\\n",
            home = img.home,
            uid = img.uid,
            gid = img.gid
        ));
        b.push_str("    npm install -g /ctx\n");
    }

    if layer.has_cargo_toml {
        switch_to_user(b, &mut as_user, img);
        b.push_str(&format!(
            "RUN --mount=type=bind,from={name},source=/,target=/ctx \\\n",
            name = layer.name
        ));
        b.push_str(&format!(
            "    --mount=type=cache,dst={home}/.cargo/registry,uid={uid},gid={gid} \\\n",
            home = img.home,
            uid = img.uid,
            gid = img.gid
        ));
        b.push_str("    cargo install --path /ctx\n");
    }

    if layer.has_user_yml {
        switch_to_user(b, &mut as_user, img);
        b.push_str(&format!(
            "RUN --mount=type=bind,from={name},source=/,target=/ctx \\\n",
            name = layer.name
        ));
        b.push_str(&format!(
            "    --mount=type=cache,dst={home}/.cache/npm,uid={uid},gid={gid} \\\n",
            home = img.home,
            uid = img.uid,
            gid = img.gid
        ));
        b.push_str("    cd /ctx && task -t user.yml install\n");
    }

    if as_user {
        b.push_str("USER root\n");
    }

    b.push('\n');
}

fn switch_to_user(b: &mut String, as_user: &mut bool, img: &ResolvedImage) {
    if !*as_user {
        b.push_str(&format!("USER {}\n", img.user));
        *as_user = true;
    }
}

fn write_dnf_install(b: &mut String, packages: &[String], copr_repos: &[String]) {
    b.push_str("RUN --mount=type=cache,dst=/var/cache/libdnf5,sharing=locked \\\n");
    b.push_str("    dnf install");

    for repo in copr_repos {
        if let Some((owner, project)) = repo.split_once('/') {
            b.push_str(&format!(
                " \\\n      --enable-repo=\"copr:copr.fedorainfracloud.org:{owner}:{project}\""
            ));
        }
    }

    b.push_str(" -y");
    for package in packages {
        b.push_str(&format!(" \\\n      {package}"));
    }
    b.push('\n');
}

fn write_apt_install(b: &mut String, packages: &[String]) {
    b.push_str("RUN --mount=type=cache,dst=/var/cache/apt,sharing=locked \\\n");
    b.push_str("    --mount=type=cache,dst=/var/lib/apt,sharing=locked \\\n");
    b.push_str("    apt-get update && apt-get install -y --no-install-recommends");
    for package in packages {
        b.push_str(&format!(" \\\n      {package}"));
    }
    b.push('\n');
}

fn write_root_yml(b: &mut String, layer_name: &str, pkg: PkgFamily) {
    b.push_str(&format!(
        "RUN --mount=type=bind,from={layer_name},source=/,target=/ctx \\\n"
    ));
    match pkg {
        PkgFamily::Deb => {
            b.push_str("    --mount=type=cache,dst=/var/cache/apt,sharing=locked \\\n");
            b.push_str("    --mount=type=cache,dst=/var/lib/apt,sharing=locked \\\n");
        }
        PkgFamily::Rpm => {
            b.push_str("    --mount=type=cache,dst=/var/cache/libdnf5,sharing=locked \\\n");
        }
    }
    b.push_str("    cd /ctx && task -t root.yml install\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, base: &str, external: bool, own: &[&str]) -> ResolvedImage {
        ResolvedImage {
            name: name.to_string(),
            base: base.to_string(),
            is_external_base: external,
            layers: own.iter().map(|l| l.to_string()).collect(),
            tag: "v1".to_string(),
            registry: Some("r".to_string()),
            pkg: PkgFamily::Rpm,
            platforms: vec!["linux/amd64".to_string()],
            user: "user".to_string(),
            uid: 1000,
            gid: 1000,
            home: "/home/user".to_string(),
            full_tag: format!("r/{name}:v1"),
            merge: false,
            bootc: false,
            auto: false,
        }
    }

    fn layer_table() -> BTreeMap<String, Layer> {
        let mut layers = BTreeMap::new();

        let mut pixi = Layer::new("pixi", vec![]);
        pixi.has_rpm_list = true;
        pixi.rpm_packages = vec!["pixi".to_string()];
        layers.insert("pixi".to_string(), pixi);

        let mut python = Layer::new("python", vec!["pixi".to_string()]);
        python.has_pixi_toml = true;
        layers.insert("python".to_string(), python);

        let mut svc = Layer::new("svc", vec!["python".to_string()]);
        svc.has_supervisord = true;
        svc.has_user_yml = true;
        layers.insert("svc".to_string(), svc);

        layers
    }

    #[test]
    fn test_render_external_base() {
        let layers = layer_table();
        let mut images = BTreeMap::new();
        images.insert(
            "app".to_string(),
            image("app", "quay.io/fedora/fedora:43", true, &["python"]),
        );

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();

        // Raw external reference, bootstrap present.
        assert!(text.contains("ARG BASE_IMAGE=quay.io/fedora/fedora:43\n"));
        assert!(text.contains("# Bootstrap\n"));
        assert!(text.contains("useradd -m -u 1000"));

        // Scratch stages in dependency order.
        let pixi_stage = text.find("FROM scratch AS pixi").unwrap();
        let python_stage = text.find("FROM scratch AS python").unwrap();
        assert!(pixi_stage < python_stage);

        // Install steps for both layers.
        assert!(text.contains("dnf install -y \\\n      pixi\n"));
        assert!(text.contains("pixi add --manifest-path /ctx/pixi.toml"));
        assert!(text.ends_with("USER user\n"));
    }

    #[test]
    fn test_render_internal_base_excludes_parent_layers() {
        let layers = layer_table();
        let mut images = BTreeMap::new();
        images.insert(
            "base".to_string(),
            image("base", "quay.io/fedora/fedora:43", true, &["pixi"]),
        );
        images.insert("app".to_string(), image("app", "base", false, &["python"]));

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();

        // Full tag for the internal base, no bootstrap.
        assert!(text.contains("ARG BASE_IMAGE=r/base:v1\n"));
        assert!(!text.contains("# Bootstrap"));

        // pixi is provided by the base, so only python appears.
        assert!(!text.contains("FROM scratch AS pixi"));
        assert!(text.contains("FROM scratch AS python"));
        assert!(!text.contains("dnf install"));
    }

    #[test]
    fn test_render_supervisord_assembly() {
        let layers = layer_table();
        let mut images = BTreeMap::new();
        images.insert(
            "app".to_string(),
            image("app", "quay.io/fedora/fedora:43", true, &["svc"]),
        );

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();

        assert!(text.contains("FROM scratch AS supervisord-conf\n"));
        assert!(text.contains("COPY templates/supervisord.header.conf /fragments/00-header.conf\n"));
        assert!(text.contains("/fragments/03-svc.conf\n"));
        assert!(text.contains("cat /fragments/*.conf > /etc/supervisord.conf\n"));
    }

    #[test]
    fn test_render_bootc_lint() {
        let layers = layer_table();
        let mut images = BTreeMap::new();
        let mut img = image("app", "quay.io/fedora/fedora:43", true, &[]);
        img.bootc = true;
        images.insert("app".to_string(), img);

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();
        assert!(text.ends_with("RUN bootc container lint\n"));
    }

    #[test]
    fn test_render_deb_family() {
        let mut layers = BTreeMap::new();
        let mut tools = Layer::new("tools", vec![]);
        tools.has_deb_list = true;
        tools.deb_packages = vec!["curl".to_string(), "git".to_string()];
        layers.insert("tools".to_string(), tools);

        let mut images = BTreeMap::new();
        let mut img = image("app", "docker.io/library/debian:13", true, &["tools"]);
        img.pkg = PkgFamily::Deb;
        images.insert("app".to_string(), img);

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();
        assert!(text.contains("apt-get update && apt-get install -y --no-install-recommends"));
        assert!(text.contains("      curl"));
        assert!(text.contains("      git"));
        assert!(!text.contains("dnf install"));
    }

    #[test]
    fn test_render_follows_global_order() {
        let mut layers = BTreeMap::new();
        layers.insert("alpha".to_string(), Layer::new("alpha", vec![]));
        layers.insert("zeta".to_string(), Layer::new("zeta", vec![]));

        let mut images = BTreeMap::new();
        images.insert(
            "app".to_string(),
            image("app", "quay.io/fedora/fedora:43", true, &["alpha", "zeta"]),
        );

        // zeta is more popular fleet-wide, so it precedes alpha even
        // though the dependency order alone would sort alphabetically.
        let global_order = vec!["zeta".to_string(), "alpha".to_string()];
        let text =
            render_containerfile(&images["app"], &images, &layers, &global_order).unwrap();

        let zeta_stage = text.find("FROM scratch AS zeta").unwrap();
        let alpha_stage = text.find("FROM scratch AS alpha").unwrap();
        assert!(zeta_stage < alpha_stage);
    }

    #[test]
    fn test_render_copr_repo() {
        let mut layers = BTreeMap::new();
        let mut editor = Layer::new("editor", vec![]);
        editor.has_rpm_list = true;
        editor.rpm_packages = vec!["helix".to_string()];
        editor.copr_repos = vec!["varlad/helix".to_string()];
        layers.insert("editor".to_string(), editor);

        let mut images = BTreeMap::new();
        images.insert(
            "app".to_string(),
            image("app", "quay.io/fedora/fedora:43", true, &["editor"]),
        );

        let text = render_containerfile(&images["app"], &images, &layers, &[]).unwrap();
        assert!(text.contains("--enable-repo=\"copr:copr.fedorainfracloud.org:varlad:helix\""));
    }
}
