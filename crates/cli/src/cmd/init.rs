//! Implementation of the `rig init` command.
//!
//! Writes a starter configuration into the current directory.

use anyhow::{Context, Result, bail};

use riglua_lib::consts::DEFAULT_CONFIG;

use crate::output;

const TEMPLATE: &str = r#"-- rig.lua: declarative description of this workstation.
-- Resources are reconciled in the order they are declared.
return {
  setup = function()
    rig.snapshot_config({ name = "root", path = "/" })
    rig.snapshot({ name = "baseline", config = "root", description = "before rig apply" })

    rig.repo({
      name = "rpmfusion-free",
      url = "https://mirrors.rpmfusion.org/free/fedora/rpmfusion-free-release.rpm",
    })
    rig.upgrade()

    rig.packages({
      name = "cli-tools",
      packages = { "git", "vim", "ripgrep", "fd-find", "tmux" },
    })

    rig.swap({ remove = "ffmpeg-free", install = "ffmpeg" })

    rig.packages({
      name = "amd-gpu-tools",
      packages = { "radeontop" },
      when = { gpu = "amd" },
    })

    rig.flatpak_remote({ name = "flathub", url = "https://dl.flathub.org/repo/flathub.flatpakrepo" })
    rig.flatpak({ name = "desktop-apps", apps = { "org.mozilla.firefox" }, prune = true })

    rig.group({ name = "libvirt" })

    rig.dotfile({
      path = "${home}/.config/rig/hello.txt",
      content = "provisioned for ${user} on ${hostname}\n",
    })

    rig.service({ unit = "libvirtd", state = "enabled" })

    rig.snapshot({ name = "final", config = "root", description = "after rig apply" })
  end,
}
"#;

pub fn cmd_init(force: bool) -> Result<()> {
  let path = std::path::Path::new(DEFAULT_CONFIG);

  if path.exists() && !force {
    bail!("{DEFAULT_CONFIG} already exists (use --force to overwrite)");
  }

  std::fs::write(path, TEMPLATE).with_context(|| format!("Failed to write {DEFAULT_CONFIG}"))?;
  output::print_success(&format!("wrote {DEFAULT_CONFIG}"));
  output::print_info("edit it, then run `rig plan` to preview changes");
  Ok(())
}
