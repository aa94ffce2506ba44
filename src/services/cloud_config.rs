/// Boundary separating the parts of the generated user-data document
pub const MIME_BOUNDARY: &str = "==YCA-CLOUD-CONFIG==";

/// Device the secondary disk appears as inside the guest
pub const SECONDARY_DEVICE: &str = "/dev/disk/by-id/virtio-secondary";

/// cloud-config that partitions, formats and mounts the secondary disk
pub fn disk_setup_fragment(mount_path: &str) -> String {
    format!(
        r#"#cloud-config
disk_setup:
  {device}:
    table_type: gpt
    layout: true
    overwrite: false
fs_setup:
  - label: data
    filesystem: ext4
    device: {device}
    partition: auto
mounts:
  - ["{device}-part1", "{mount}", "auto", "defaults,nofail", "0", "2"]
"#,
        device = SECONDARY_DEVICE,
        mount = mount_path
    )
}

/// Combine cloud-config documents into one multipart MIME message, keeping their order
pub fn multipart_user_data(parts: &[String]) -> String {
    let mut out = format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\nMIME-Version: 1.0\n",
        MIME_BOUNDARY
    );
    for part in parts {
        out.push_str(&format!("\n--{}\n", MIME_BOUNDARY));
        out.push_str("Content-Type: text/cloud-config; charset=\"us-ascii\"\n");
        out.push_str("MIME-Version: 1.0\n");
        out.push_str("Content-Transfer-Encoding: 7bit\n\n");
        out.push_str(part.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("\n--{}--\n", MIME_BOUNDARY));
    out
}
