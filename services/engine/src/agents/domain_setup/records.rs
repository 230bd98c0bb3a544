//! Mail DNS record template for Microsoft 365 sending domains

use cloudflare_dns::{DnsRecordType, NewDnsRecord};

/// TTL applied to every provisioned record, in seconds
pub const RECORD_TTL: u32 = 3600;

const SPF_RECORD: &str =
    "v=spf1 include:_spf.mx.cloudflare.net include:spf.protection.outlook.com -all";
const MX_HOST: &str = "outlook-com.office365.com";
const DOMAIN_VERIFICATION: &str = "MS=ms12345678";

fn record(record_type: DnsRecordType, name: &str, content: String) -> NewDnsRecord {
    NewDnsRecord {
        record_type,
        name: name.to_string(),
        content,
        ttl: RECORD_TTL,
        proxied: false,
        priority: None,
    }
}

/// SPF, DKIM, DMARC, MX and verification records for `domain`.
///
/// DMARC aggregate and forensic reports go to `report_email`.
pub fn email_records(domain: &str, report_email: &str) -> Vec<NewDnsRecord> {
    vec![
        record(DnsRecordType::TXT, "@", SPF_RECORD.to_string()),
        record(
            DnsRecordType::CNAME,
            "selector1._domainkey",
            format!("selector1-{}._domainkey.onmicrosoft.com", domain),
        ),
        record(
            DnsRecordType::CNAME,
            "selector2._domainkey",
            format!("selector2-{}._domainkey.onmicrosoft.com", domain),
        ),
        record(
            DnsRecordType::TXT,
            "_dmarc",
            format!(
                "v=DMARC1; p=quarantine; rua=mailto:{0}; ruf=mailto:{0}; fo=1",
                report_email
            ),
        ),
        NewDnsRecord {
            priority: Some(0),
            ..record(DnsRecordType::MX, "@", MX_HOST.to_string())
        },
        record(DnsRecordType::TXT, "@", DOMAIN_VERIFICATION.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_records_with_interpolation() {
        let records = email_records("example.com", "dmarc@example.com");
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.ttl == 3600 && !r.proxied));

        assert_eq!(
            records[1].content,
            "selector1-example.com._domainkey.onmicrosoft.com"
        );
        assert_eq!(
            records[2].content,
            "selector2-example.com._domainkey.onmicrosoft.com"
        );
        assert_eq!(
            records[3].content,
            "v=DMARC1; p=quarantine; rua=mailto:dmarc@example.com; ruf=mailto:dmarc@example.com; fo=1"
        );
    }

    #[test]
    fn test_only_mx_has_priority() {
        let records = email_records("example.com", "dmarc@example.com");
        let with_priority: Vec<_> = records.iter().filter(|r| r.priority.is_some()).collect();

        assert_eq!(with_priority.len(), 1);
        assert_eq!(with_priority[0].record_type, DnsRecordType::MX);
        assert_eq!(with_priority[0].priority, Some(0));
    }
}
