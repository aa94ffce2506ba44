use std::collections::BTreeMap;
use yc_agents::models::{AgentUserData, SourceImage};
use yc_agents::services::{
    build_create_request, merge_metadata, multipart_user_data, parse_custom_props, parse_dns_records, CreateContext,
    MIME_BOUNDARY,
};
use yc_agents::utils::GIB;
use yc_agents::ImageDetails;

fn details() -> ImageDetails {
    ImageDetails {
        source_id: "agent-".to_string(),
        source_image: "fd8img".to_string(),
        zone: "ru-central1-a".to_string(),
        subnet: "e9bsub".to_string(),
        machine_cores: 2,
        machine_memory: 4 * GIB,
        max_instances: 2,
        secondary_disk_mount_path: "/mnt/data".to_string(),
        ..Default::default()
    }
}

fn source_image() -> SourceImage {
    SourceImage {
        id: "fd8img".to_string(),
        name: "ubuntu-agent".to_string(),
        description: String::new(),
        min_disk_size: 20 * GIB,
    }
}

fn build(details: &ImageDetails) -> serde_json::Value {
    let image = source_image();
    let user_data = AgentUserData::new("https://ci.example.com", "token", "profile-1");
    let request = build_create_request(&CreateContext {
        details,
        source_image: &image,
        instance_name: "agent-7",
        default_folder_id: "sa-folder",
        server_id: "server-1",
        profile_id: "profile-1",
        user_data: &user_data,
    })
    .unwrap();
    serde_json::to_value(&request).unwrap()
}

#[test]
fn test_dns_records_expand_templates() {
    let records = parse_dns_records("zoneA:web-{name},api-{name}\nno-colon-here", "agent7");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].fqdn, "web-agent7");
    assert_eq!(records[1].fqdn, "api-agent7");
    assert!(records.iter().all(|r| r.dns_zone_id == "zoneA"));
}

#[test]
fn test_multipart_keeps_part_order() {
    let disk = "#cloud-config\nmounts: []".to_string();
    let custom = "#cloud-config\npackages: [git]".to_string();
    let doc = multipart_user_data(&[disk, custom]);

    let delimiter = format!("--{}\n", MIME_BOUNDARY);
    let parts: Vec<&str> = doc.split(delimiter.as_str()).skip(1).collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].starts_with("Content-Type: text/cloud-config"));
    assert!(parts[0].contains("mounts: []"));
    assert!(parts[1].starts_with("Content-Type: text/cloud-config"));
    assert!(parts[1].contains("packages: [git]"));
    assert!(doc.contains(&format!("boundary=\"{}\"", MIME_BOUNDARY)));
    assert!(doc.trim_end().ends_with(&format!("--{}--", MIME_BOUNDARY)));
}

#[test]
fn test_metadata_merge_protects_reserved_keys() {
    let mut metadata = BTreeMap::new();
    metadata.insert("ci-server".to_string(), "server-1".to_string());
    merge_metadata(
        &mut metadata,
        Some(r##"{"user-data":"#cloud-config","ci-server":"evil","team":"ci","replicas":3}"##),
    );
    assert_eq!(metadata.get("ci-server").map(String::as_str), Some("server-1"));
    assert_eq!(metadata.get("team").map(String::as_str), Some("ci"));
    assert!(!metadata.contains_key("user-data"));
    assert!(!metadata.contains_key("replicas"));
}

#[test]
fn test_metadata_merge_ignores_invalid_json() {
    let mut metadata = BTreeMap::new();
    merge_metadata(&mut metadata, Some("{not json"));
    merge_metadata(&mut metadata, Some("[1, 2]"));
    assert!(metadata.is_empty());
}

#[test]
fn test_custom_props_skip_malformed_pairs() {
    let props = parse_custom_props("env=prod, bad, a=b=c, =empty, team = ci");
    assert_eq!(
        props,
        vec![
            ("env".to_string(), "prod".to_string()),
            ("team".to_string(), "ci".to_string())
        ]
    );
}

#[test]
fn test_minimal_request() {
    let body = build(&details());

    assert_eq!(body["folderId"], "sa-folder");
    assert_eq!(body["name"], "agent-7");
    assert_eq!(body["zoneId"], "ru-central1-a");
    assert_eq!(body["resourcesSpec"]["cores"], 2);
    assert_eq!(body["resourcesSpec"]["memory"], 4 * GIB);
    assert_eq!(body["bootDiskSpec"]["diskSpec"]["size"], 20 * GIB);
    assert_eq!(body["bootDiskSpec"]["diskSpec"]["imageId"], "fd8img");
    assert!(body.get("secondaryDiskSpecs").is_none());
    assert!(body.get("platformId").is_none());
    assert!(body.get("serviceAccountId").is_none());
    assert!(body.get("hostname").is_none());

    let nic = &body["networkInterfaceSpecs"][0];
    assert_eq!(nic["subnetId"], "e9bsub");
    assert!(nic["primaryV4AddressSpec"].get("oneToOneNatSpec").is_none());
    assert!(nic.get("primaryV6AddressSpec").is_none());

    let metadata = &body["metadata"];
    assert_eq!(metadata["ci-server"], "server-1");
    assert_eq!(metadata["ci-profile"], "profile-1");
    assert_eq!(metadata["ci-source"], "agent-");
    assert!(metadata.get("user-data").is_none());
}

#[test]
fn test_user_data_carries_image_and_custom_props() {
    let mut d = details();
    d.custom_props = Some("env=prod,broken".to_string());
    let body = build(&d);

    let encoded = body["metadata"]["ci-data"].as_str().unwrap();
    let data = AgentUserData::deserialize(encoded).unwrap();
    assert_eq!(data.agent_name, "agent-7");
    assert_eq!(data.custom_params.get("cloud.image.id").map(String::as_str), Some("fd8img"));
    assert_eq!(data.custom_params.get("cloud.image.name").map(String::as_str), Some("ubuntu-agent"));
    assert_eq!(data.custom_params.get("env").map(String::as_str), Some("prod"));
    assert!(!data.custom_params.contains_key("broken"));
}

#[test]
fn test_full_request() {
    let mut d = details();
    d.disk_size = 50 * GIB;
    d.disk_type = Some("network-ssd".to_string());
    d.secondary_disk_size = 100 * GIB;
    d.secondary_disk_type = Some("network-hdd".to_string());
    d.cloud_config = Some("#cloud-config\npackages: [git]".to_string());
    d.nat = true;
    d.ipv6 = true;
    d.dns_records = Some("zoneA:{name}.ci".to_string());
    d.security_groups = vec!["sg1".to_string()];
    d.hostname = Some("host-{name}".to_string());
    d.preemptible = true;
    d.instance_folder = Some("other-folder".to_string());
    d.service_account = Some("sa-vm".to_string());
    d.platform_id = Some("standard-v3".to_string());
    d.metadata = Some(r#"{"team":"ci"}"#.to_string());
    let body = build(&d);

    assert_eq!(body["folderId"], "other-folder");
    assert_eq!(body["hostname"], "host-agent-7");
    assert_eq!(body["platformId"], "standard-v3");
    assert_eq!(body["serviceAccountId"], "sa-vm");
    assert_eq!(body["schedulingPolicy"]["preemptible"], true);
    assert_eq!(body["bootDiskSpec"]["diskSpec"]["size"], 50 * GIB);
    assert_eq!(body["bootDiskSpec"]["diskSpec"]["typeId"], "network-ssd");

    let secondary = &body["secondaryDiskSpecs"][0];
    assert_eq!(secondary["deviceName"], "secondary");
    assert_eq!(secondary["diskSpec"]["size"], 100 * GIB);
    assert_eq!(secondary["diskSpec"]["typeId"], "network-hdd");

    let nic = &body["networkInterfaceSpecs"][0];
    assert_eq!(nic["primaryV4AddressSpec"]["oneToOneNatSpec"]["ipVersion"], "IPV4");
    assert_eq!(nic["primaryV6AddressSpec"]["dnsRecordSpecs"][0]["fqdn"], "agent-7.ci");
    assert_eq!(nic["primaryV6AddressSpec"]["dnsRecordSpecs"][0]["dnsZoneId"], "zoneA");
    assert_eq!(nic["securityGroupIds"][0], "sg1");

    let user_data = body["metadata"]["user-data"].as_str().unwrap();
    assert_eq!(user_data.matches("Content-Type: text/cloud-config").count(), 2);
    let disk_at = user_data.find("disk_setup").unwrap();
    let custom_at = user_data.find("packages: [git]").unwrap();
    assert!(disk_at < custom_at);
    assert_eq!(body["metadata"]["team"], "ci");
}
