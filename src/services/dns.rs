use crate::models::DnsRecordSpec;
use crate::utils::parse_csv;

pub const DNS_RECORD_TTL: i64 = 300;

/// Expand `zoneId:template,template` lines into record specs for one instance.
///
/// `{name}` in a template is replaced with the instance name. Lines without a
/// colon or with an empty zone are skipped.
pub fn parse_dns_records(raw: &str, instance_name: &str) -> Vec<DnsRecordSpec> {
    raw.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (zone, templates) = line.split_once(':')?;
            let zone = zone.trim();
            if zone.is_empty() {
                return None;
            }
            Some(
                parse_csv(templates)
                    .into_iter()
                    .map(|template| DnsRecordSpec {
                        fqdn: template.replace("{name}", instance_name),
                        dns_zone_id: zone.to_string(),
                        ttl: DNS_RECORD_TTL,
                        ptr: false,
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect()
}
