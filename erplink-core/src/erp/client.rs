//! HTTP client for the ERP API.

use crate::config::ErpLinkConfig;
use crate::crypto::erp_password_hash;
use crate::erp::models::{
    GenerationInfo, InvoiceFromQuotationRequest, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse,
};
use crate::erp::signer::RequestSigner;
use crate::storage::Store;
use crate::sync::models::SyncScope;
use crate::{ErpLinkError, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Typed wrapper around the ERP HTTP API.
///
/// Every call except device registration and the generation probe is signed
/// through the [`RequestSigner`].
pub struct ErpClient {
    http: reqwest::Client,
    base_url: String,
    signer: RequestSigner,
}

impl ErpClient {
    /// Create a new ERP client.
    pub fn new(base_url: &str, timeout: Duration, signer: RequestSigner) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErpLinkError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Create a client from configuration, signing with devices from `store`.
    pub fn from_config(config: &ErpLinkConfig, store: Store) -> Result<Self> {
        Self::new(
            &config.erp_url,
            Duration::from_secs(config.request_timeout_secs),
            RequestSigner::new(store),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Device registration handshake (unsigned).
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let builder = self.http.post(self.url("/Devices/Register/")).json(request);
        self.fetch(builder, "registration").await
    }

    /// Generation version and lock number of the ERP instance (unsigned).
    pub async fn get_generation_info(&self) -> Result<GenerationInfo> {
        let builder = self.http.get(self.url("/General/GenerationVersion/"));
        self.fetch(builder, "generation version").await
    }

    /// Log in and obtain a bearer token.
    ///
    /// The password is sent as its MD5 hex digest, as the ERP requires.
    pub async fn login(
        &self,
        tenant_id: &str,
        integration_id: u32,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse> {
        let body = LoginRequest {
            user_name: username,
            password_hash: erp_password_hash(password),
        };
        let builder = self
            .signed(Method::POST, "/users/login", tenant_id, integration_id, None)?
            .json(&body);
        self.fetch(builder, "login").await
    }

    /// Whether `token` is still accepted by the ERP.
    pub async fn is_authorized(&self, tenant_id: &str, integration_id: u32, token: &str) -> Result<bool> {
        let builder = self.signed(Method::GET, "/IsAuthorized", tenant_id, integration_id, Some(token))?;
        self.fetch(builder, "authorization check").await
    }

    // --- Items ---

    pub async fn get_items(&self, tenant_id: &str, integration_id: u32, token: &str) -> Result<Vec<Value>> {
        self.get_json("/Items", tenant_id, integration_id, token).await
    }

    /// Item image as a Base64 string.
    pub async fn get_item_image(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        item_id: i64,
    ) -> Result<String> {
        self.get_json(&format!("/Items/{}/Image", item_id), tenant_id, integration_id, token)
            .await
    }

    pub async fn get_inventories(&self, tenant_id: &str, integration_id: u32, token: &str) -> Result<Vec<Value>> {
        self.get_json("/Items/Inventories", tenant_id, integration_id, token)
            .await
    }

    pub async fn get_price_note_items(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<Vec<Value>> {
        self.get_json("/PriceNoteItems", tenant_id, integration_id, token)
            .await
    }

    // --- Customers ---

    pub async fn get_customers(&self, tenant_id: &str, integration_id: u32, token: &str) -> Result<Vec<Value>> {
        self.get_json("/Customers", tenant_id, integration_id, token).await
    }

    pub async fn get_customer(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        customer_id: i64,
    ) -> Result<Value> {
        self.get_json(&format!("/Customers/{}", customer_id), tenant_id, integration_id, token)
            .await
    }

    // --- Quotations ---

    /// Quotation headers, optionally bounded by date (ERP date strings).
    pub async fn get_quotations(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        from_date: Option<&str>,
        to_date: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query = Vec::new();
        if let Some(from) = from_date {
            query.push(("fromDate", from));
        }
        if let Some(to) = to_date {
            query.push(("toDate", to));
        }
        let builder = self
            .signed(Method::GET, "/Quotations", tenant_id, integration_id, Some(token))?
            .query(&query);
        self.fetch(builder, "/Quotations").await
    }

    /// One quotation including its items.
    pub async fn get_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        quotation_id: i64,
    ) -> Result<Value> {
        self.get_json(&format!("/Quotations/{}", quotation_id), tenant_id, integration_id, token)
            .await
    }

    pub async fn create_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        body: &Value,
    ) -> Result<Value> {
        self.post_json("/Quotations", body, tenant_id, integration_id, token)
            .await
    }

    pub async fn close_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        quotation_id: i64,
    ) -> Result<()> {
        let path = format!("/Quotations/{}/Close", quotation_id);
        self.post_empty(&path, tenant_id, integration_id, token).await
    }

    pub async fn unclose_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        quotation_id: i64,
    ) -> Result<()> {
        let path = format!("/Quotations/{}/UnClose", quotation_id);
        self.post_empty(&path, tenant_id, integration_id, token).await
    }

    pub async fn delete_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        quotation_id: i64,
    ) -> Result<()> {
        let path = format!("/Quotations/{}", quotation_id);
        let builder = self.signed(Method::DELETE, &path, tenant_id, integration_id, Some(token))?;
        self.send(builder).await?;
        Ok(())
    }

    // --- Invoices ---

    pub async fn get_invoices(&self, tenant_id: &str, integration_id: u32, token: &str) -> Result<Vec<Value>> {
        self.get_json("/invoices", tenant_id, integration_id, token).await
    }

    pub async fn get_invoice(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        invoice_id: i64,
    ) -> Result<Value> {
        self.get_json(&format!("/invoices/{}", invoice_id), tenant_id, integration_id, token)
            .await
    }

    pub async fn create_invoice(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        body: &Value,
    ) -> Result<Value> {
        self.post_json("/invoices", body, tenant_id, integration_id, token)
            .await
    }

    /// Convert a quotation into an invoice.
    pub async fn create_invoice_from_quotation(
        &self,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
        quotation_id: i64,
    ) -> Result<Value> {
        let body = InvoiceFromQuotationRequest { quotation_id };
        self.post_json("/Invoices/BasedOnQuotation", &body, tenant_id, integration_id, token)
            .await
    }

    /// Full remote collection backing a sync scope.
    pub async fn fetch_collection(
        &self,
        scope: SyncScope,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<Vec<Value>> {
        match scope {
            SyncScope::Items => self.get_items(tenant_id, integration_id, token).await,
            SyncScope::Inventories => self.get_inventories(tenant_id, integration_id, token).await,
            SyncScope::PriceNotes => {
                self.get_price_note_items(tenant_id, integration_id, token)
                    .await
            }
            SyncScope::Customers => self.get_customers(tenant_id, integration_id, token).await,
            SyncScope::Invoices => self.get_invoices(tenant_id, integration_id, token).await,
            SyncScope::Quotations => {
                self.get_quotations(tenant_id, integration_id, token, None, None)
                    .await
            }
        }
    }

    // --- Internal helpers ---

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn signed(
        &self,
        method: Method,
        path: &str,
        tenant_id: &str,
        integration_id: u32,
        token: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        let headers = self.signer.build_headers(tenant_id, integration_id, token)?;
        debug!(%method, path, tenant_id, integration_id, "Signed ERP request");
        Ok(headers.apply(self.http.request(method, self.url(path))))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<T> {
        let builder = self.signed(Method::GET, path, tenant_id, integration_id, Some(token))?;
        self.fetch(builder, path).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        tenant_id: &str,
        integration_id: u32,
        token: &str,
    ) -> Result<T> {
        let builder = self
            .signed(Method::POST, path, tenant_id, integration_id, Some(token))?
            .json(body);
        self.fetch(builder, path).await
    }

    async fn post_empty(&self, path: &str, tenant_id: &str, integration_id: u32, token: &str) -> Result<()> {
        let builder = self
            .signed(Method::POST, path, tenant_id, integration_id, Some(token))?
            .json(&serde_json::json!({}));
        self.send(builder).await?;
        Ok(())
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Vec<u8>> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ErpLinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.map_err(|e| {
                ErpLinkError::Transport(format!(
                    "ERP returned {} but its body could not be read: {}",
                    status, e
                ))
            })?;
            return Err(ErpLinkError::Erp {
                status: status.as_u16(),
                body,
            });
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ErpLinkError::Transport(e.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<T> {
        let body = self.send(builder).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ErpLinkError::InvalidResponse(format!("{}: {}", what, e)))
    }
}
