use serde_json::Value;

use super::client::ApiClient;
use crate::error::{CloudError, Result};
use crate::models::{LookupEntry, SourceImage};
use crate::utils::sort_by_display;

fn str_field(item: &Value, key: &str) -> String {
    item.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

/// Resolve a source image by id. A missing image is `None`, other failures propagate.
pub async fn get_image(api: &ApiClient, image_id: &str) -> Result<Option<SourceImage>> {
    let endpoint = format!("/compute/v1/images/{}", image_id);
    match api.call("compute", "GET", &endpoint, None, None).await {
        Ok(payload) => serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| CloudError::MalformedResponse(format!("image {}: {}", image_id, e))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn list_images(api: &ApiClient, folder_id: &str) -> Result<Vec<LookupEntry>> {
    let params = vec![("folderId".to_string(), folder_id.to_string())];
    let items = api.list_all("compute", "/compute/v1/images", "images", &params).await?;
    let mut entries: Vec<LookupEntry> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<SourceImage>(item).ok())
        .map(|image| LookupEntry::new(image.id.clone(), image.display_name()).with_detail(image.name.clone()))
        .collect();
    sort_by_display(&mut entries);
    Ok(entries)
}

pub async fn list_zones(api: &ApiClient) -> Result<Vec<LookupEntry>> {
    let items = api.list_all("compute", "/compute/v1/zones", "zones", &[]).await?;
    let mut entries: Vec<LookupEntry> = items
        .iter()
        .map(|z| LookupEntry::new(str_field(z, "id"), str_field(z, "id")).with_detail(str_field(z, "regionId")))
        .collect();
    sort_by_display(&mut entries);
    Ok(entries)
}

pub async fn list_disk_types(api: &ApiClient) -> Result<Vec<LookupEntry>> {
    let items = api.list_all("compute", "/compute/v1/diskTypes", "diskTypes", &[]).await?;
    let mut entries: Vec<LookupEntry> = items
        .iter()
        .map(|d| {
            let id = str_field(d, "id");
            let description = str_field(d, "description");
            let display = if description.is_empty() { id.clone() } else { description };
            LookupEntry::new(id, display)
        })
        .collect();
    sort_by_display(&mut entries);
    Ok(entries)
}

pub async fn list_networks(api: &ApiClient, folder_id: &str) -> Result<Vec<LookupEntry>> {
    let params = vec![("folderId".to_string(), folder_id.to_string())];
    let items = api.list_all("vpc", "/vpc/v1/networks", "networks", &params).await?;
    let mut entries: Vec<LookupEntry> = items
        .iter()
        .map(|n| LookupEntry::new(str_field(n, "id"), str_field(n, "name")).with_detail(str_field(n, "description")))
        .collect();
    sort_by_display(&mut entries);
    Ok(entries)
}

pub async fn list_subnets(api: &ApiClient, folder_id: &str) -> Result<Vec<LookupEntry>> {
    let params = vec![("folderId".to_string(), folder_id.to_string())];
    let items = api.list_all("vpc", "/vpc/v1/subnets", "subnets", &params).await?;
    let mut entries: Vec<LookupEntry> = items
        .iter()
        .map(|s| LookupEntry::new(str_field(s, "id"), str_field(s, "name")).with_detail(str_field(s, "networkId")))
        .collect();
    sort_by_display(&mut entries);
    Ok(entries)
}
