use rust_decimal::Decimal;

use super::Email;
use crate::ledger::TransactionKind;
use crate::models::{CryptoTransaction, Transaction, User};
use crate::money::format_usd;

/// Customer-facing summary of one ledger event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionNotice {
    pub recipient_name: String,
    /// Raw type tag, e.g. `deposit` or `send`
    pub kind: String,
    pub kind_label: String,
    pub credit: bool,
    pub amount: Decimal,
    /// `USD` for cash, the symbol for crypto
    pub currency: String,
    pub description: String,
    pub reference: String,
    pub status: String,
    pub fee: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub reason: Option<String>,
}

pub fn status_label(status: &str) -> &'static str {
    match status {
        "approved" | "completed" => "Completed",
        "rejected" => "Rejected",
        "pending_approval" => "Pending Approval",
        _ => "Pending",
    }
}

/// `wire-transfer` -> `Wire Transfer`
fn title_case(tag: &str) -> String {
    tag.split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn customer_name(name: &str) -> String {
    if name.trim().is_empty() {
        "Customer".to_string()
    } else {
        name.trim().to_string()
    }
}

impl TransactionNotice {
    pub fn cash(
        recipient_name: &str,
        kind: &str,
        amount: Decimal,
        description: &str,
        reference: &str,
        status: &str,
    ) -> Self {
        let credit = TransactionKind::parse(kind).map(|k| k.is_credit()).unwrap_or(false);
        Self {
            recipient_name: customer_name(recipient_name),
            kind: kind.to_string(),
            kind_label: title_case(kind),
            credit,
            amount,
            currency: "USD".to_string(),
            description: description.to_string(),
            reference: reference.to_string(),
            status: status.to_string(),
            fee: None,
            tx_hash: None,
            reason: None,
        }
    }

    pub fn from_transaction(user: &User, tx: &Transaction) -> Self {
        let mut notice = Self::cash(
            &user.name,
            &tx.kind,
            tx.amount,
            &tx.description,
            &tx.reference,
            &tx.status,
        );
        if tx.fee > Decimal::ZERO {
            notice.fee = Some(tx.fee);
        }
        notice.reason = tx.rejection_reason.clone();
        notice
    }

    pub fn from_crypto(user: &User, tx: &CryptoTransaction) -> Self {
        let (kind_label, credit) = match tx.tx_type.as_str() {
            "conversion" => ("Crypto Purchase".to_string(), true),
            "send" => ("Crypto Transfer".to_string(), false),
            other => (title_case(other), true),
        };
        Self {
            recipient_name: customer_name(&user.name),
            kind: tx.tx_type.clone(),
            kind_label,
            credit,
            amount: tx.crypto_amount.unwrap_or_default(),
            currency: tx.crypto_currency.clone().unwrap_or_default(),
            description: tx.description.clone(),
            reference: tx.reference.clone(),
            status: tx.status.clone(),
            fee: (tx.fee > Decimal::ZERO).then_some(tx.fee),
            tx_hash: tx.tx_hash.clone(),
            reason: tx.rejection_reason.clone(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        status_label(&self.status)
    }

    fn format_amount(&self, amount: Decimal) -> String {
        if self.currency == "USD" {
            format_usd(amount)
        } else {
            format!("{} {}", amount.normalize(), self.currency)
        }
    }

    pub fn signed_amount(&self) -> String {
        let sign = if self.credit { "+" } else { "-" };
        format!("{}{}", sign, self.format_amount(self.amount))
    }

    pub fn subject(&self) -> String {
        format!(
            "Transaction {}: {} {}",
            self.status_label(),
            self.description,
            self.signed_amount()
        )
    }

    fn text_body(&self) -> String {
        let mut lines = vec![
            format!("Hello {},", self.recipient_name),
            String::new(),
            format!("Your {} is {}.", self.kind_label.to_lowercase(), self.status_label().to_lowercase()),
            String::new(),
            format!("Type: {}", self.kind_label),
            format!("Amount: {}", self.signed_amount()),
            format!("Description: {}", self.description),
            format!("Reference: {}", self.reference),
            format!("Status: {}", self.status_label()),
        ];
        if let Some(fee) = self.fee {
            lines.push(format!("Fee: {}", self.format_amount(fee)));
        }
        if let Some(hash) = &self.tx_hash {
            lines.push(format!("Transaction hash: {}", hash));
        }
        if let Some(reason) = &self.reason {
            lines.push(format!("Reason: {}", reason));
        }
        lines.push(String::new());
        lines.push("If you did not expect this transaction, contact support right away.".to_string());
        lines.join("\n")
    }

    fn html_body(&self) -> String {
        let row = |label: &str, value: &str| {
            format!(
                r#"<tr><td style="color: #666; padding: 6px 0;">{}</td><td style="text-align: right; padding: 6px 0;">{}</td></tr>"#,
                label,
                escape_html(value)
            )
        };

        let mut rows = vec![
            row("Type", &self.kind_label),
            row("Amount", &self.signed_amount()),
            row("Description", &self.description),
            row("Reference", &self.reference),
            row("Status", self.status_label()),
        ];
        if let Some(fee) = self.fee {
            rows.push(row("Fee", &self.format_amount(fee)));
        }
        if let Some(hash) = &self.tx_hash {
            rows.push(row("Transaction hash", hash));
        }
        if let Some(reason) = &self.reason {
            rows.push(row("Reason", reason));
        }

        let accent = match (self.status_label(), self.credit) {
            ("Rejected", _) => "#c0392b",
            ("Completed", true) => "#1e8449",
            ("Completed", false) => "#1f2d3d",
            _ => "#b9770e",
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f6f8; color: #1f2d3d; padding: 40px 20px; margin: 0;">
    <div style="max-width: 480px; margin: 0 auto; background-color: #fff; border-radius: 8px; padding: 32px;">
        <p style="font-size: 14px; margin: 0 0 16px 0;">Hello {name},</p>
        <h1 style="font-size: 22px; font-weight: 500; margin: 0 0 8px 0; color: {accent};">{label} {status}</h1>
        <p style="font-size: 28px; font-weight: 600; margin: 0 0 24px 0;">{amount}</p>
        <table style="width: 100%; font-size: 14px; border-collapse: collapse;">
            {rows}
        </table>
        <p style="color: #999; font-size: 12px; margin: 24px 0 0 0;">If you did not expect this transaction, contact support right away.</p>
    </div>
</body>
</html>"#,
            name = escape_html(&self.recipient_name),
            accent = accent,
            label = escape_html(&self.kind_label),
            status = self.status_label(),
            amount = escape_html(&self.signed_amount()),
            rows = rows.join("\n            "),
        )
    }

    pub fn render(&self, to: &str) -> Email {
        Email {
            to: vec![to.to_string()],
            subject: self.subject(),
            html: self.html_body(),
            text: self.text_body(),
            reply_to: None,
            headers: vec![
                ("X-Transaction-Reference", self.reference.clone()),
                ("X-Transaction-Type", self.kind.clone()),
                ("X-Transaction-Status", self.status.clone()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn labels_follow_status() {
        assert_eq!(status_label("approved"), "Completed");
        assert_eq!(status_label("completed"), "Completed");
        assert_eq!(status_label("rejected"), "Rejected");
        assert_eq!(status_label("pending_approval"), "Pending Approval");
        assert_eq!(status_label("pending"), "Pending");
        assert_eq!(status_label("processing"), "Pending");
    }

    #[test]
    fn subject_carries_signed_amount() {
        let debit = TransactionNotice::cash("", "wire-transfer", dec!(1250), "Rent", "WIR-1-AAAA", "pending");
        assert_eq!(debit.subject(), "Transaction Pending: Rent -$1,250.00");
        assert_eq!(debit.kind_label, "Wire Transfer");
        assert_eq!(debit.recipient_name, "Customer");

        let credit = TransactionNotice::cash("Ada", "interest", dec!(3.5), "Monthly interest", "ADM-1-AAAAAA", "completed");
        assert_eq!(credit.subject(), "Transaction Completed: Monthly interest +$3.50");
    }

    #[test]
    fn render_sets_tracking_headers() {
        let notice = TransactionNotice::cash("Ada", "deposit", dec!(10), "Cash", "ADM-9-ZZZZZZ", "approved");
        let email = notice.render("ada@bank.test");

        assert_eq!(email.to, ["ada@bank.test"]);
        assert_eq!(
            email.headers,
            [
                ("X-Transaction-Reference", "ADM-9-ZZZZZZ".to_string()),
                ("X-Transaction-Type", "deposit".to_string()),
                ("X-Transaction-Status", "approved".to_string()),
            ]
        );
        assert!(email.text.contains("Reference: ADM-9-ZZZZZZ"));
        assert!(email.html.contains("+$10.00"));
    }

    #[test]
    fn html_escapes_user_text() {
        let notice = TransactionNotice::cash("<b>", "payment", dec!(1), "<script>", "R", "pending");
        let html = notice.render("x@bank.test").html;
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn crypto_amounts_use_the_symbol() {
        let mut notice = TransactionNotice::cash("Ada", "send", dec!(0.50), "Send 0.5 BTC", "CSND-1-AAAA", "rejected");
        notice.currency = "BTC".into();
        notice.credit = false;
        notice.fee = Some(dec!(0.0001));
        notice.reason = Some("Address flagged".into());

        assert_eq!(notice.signed_amount(), "-0.5 BTC");
        let text = notice.render("ada@bank.test").text;
        assert!(text.contains("Fee: 0.0001 BTC"));
        assert!(text.contains("Reason: Address flagged"));
    }
}
