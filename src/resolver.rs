//! Peer resolution: the RFC 2915 retrieve/filter/sort/rewrite loop.
//!
//! A [`PeerResolver`] drives one NAPTR answer set per call: it builds the
//! discovery FQDN from a [`ResolverContext`], retrieves NAPTR records,
//! removes the ones that do not serve the requested target and interface,
//! sorts the survivors by `(order, preference)` and walks them in order,
//! rewriting the working domain name and chasing A or SRV lookups until one
//! candidate yields an IPv4 address.
//!
//! Each call owns its record set and holds no state across calls, so a
//! resolver can be shared freely between tasks. Batch mode fans lookups out
//! over a bounded number of concurrent exchanges with query rate limiting.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::context::{ResolverContext, MAX_DOMAIN_NAME_LEN};
use crate::naptr::{NaptrRecord, RecordSet};
use crate::rate_limit::{batch_query_limiter, RateLimiter};
use crate::rewrite::{reg_match, reg_replace};
use crate::transport::DnsTransport;
use crate::wire::{self, Header, RecordType, Response};

/// How the Regexp clause of the NAPTR filter treats the working domain name.
///
/// RFC 2915 section 4 keeps a record when "the Regexp field matches the
/// string held by the client". Deployed EPC resolvers do the opposite: they
/// keep a record whose pattern does *not* match the current domain name and
/// discard the ones that do. `Legacy` reproduces that inverted test and is
/// the default, so peer selection is unchanged against live networks;
/// `Rfc2915` applies the test as written in the RFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Keep records whose pattern does not match the working domain name
    #[default]
    Legacy,
    /// Keep records whose pattern matches, as RFC 2915 specifies
    Rfc2915,
}

/// Tunables for one resolver instance.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Regexp filter behavior, see [`FilterMode`]
    pub filter_mode: FilterMode,
    /// Also remove records whose replacement name failed to decode.
    /// Off by default: an undecodable record stays in the set and simply
    /// carries empty fields into the transform step.
    pub drop_invalid_records: bool,
}

/// Outcome of one peer resolution, shaped for CLI and batch output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerResult {
    /// Access point name the lookup ran for (empty for the EPC root domain)
    pub apn: String,
    /// Service target token, e.g. "pgw"
    pub target: String,
    /// Discovery FQDN the NAPTR query was sent to
    pub domain: String,
    /// Dotted-decimal peer address, when one resolved
    pub address: Option<String>,
    /// Wall-clock time spent on this lookup in milliseconds
    pub duration_ms: u64,
    /// Failure description, when no address resolved
    pub error: Option<String>,
}

/// NAPTR-driven peer discovery engine.
pub struct PeerResolver<T: DnsTransport> {
    transport: Arc<T>,
    options: ResolverOptions,
    concurrent_limit: usize,
}

impl<T: DnsTransport> PeerResolver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            options: ResolverOptions::default(),
            concurrent_limit: 16,
        }
    }

    /// Replaces the resolver options.
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Caps how many lookups batch mode keeps in flight.
    pub fn with_concurrency(mut self, concurrent_limit: usize) -> Self {
        self.concurrent_limit = concurrent_limit.max(1);
        self
    }

    /// Resolves one peer address for `ctx`.
    ///
    /// Returns `Ok(Some(addr))` with the first address a candidate record
    /// yields, `Ok(None)` when the NAPTR chain is exhausted without an
    /// address (query failure, everything filtered out, or no successful
    /// A/SRV resolution), and `Err` only for invalid caller input.
    pub async fn resolve(&self, ctx: &ResolverContext) -> Result<Option<Ipv4Addr>> {
        let mut dname = ctx.build_domain_name()?;
        debug!("built discovery domain name '{}'", dname);

        let Some(mut records) = self.naptr_query(&dname).await else {
            return Ok(None);
        };
        debug!("NAPTR query returned {} records", records.count());

        self.filter_records(ctx, &dname, &mut records);
        debug!("{} records remain after filtering", records.count());

        records.sort();

        let mut resolved = None;
        let mut cursor = records.head();
        while let Some(handle) = cursor {
            let record = records.get(handle).expect("cursor handles are live");

            // The rewrite compounds: a candidate that fails to resolve still
            // leaves its transformation in place for the next one.
            transform_domain_name(record, &mut dname);

            let (count, address) = self.typed_ip_query(record.flag, &dname).await;
            if count > 0 {
                debug!("resolved '{}' via NAPTR chain", dname);
                resolved = address;
                break;
            }

            cursor = records.next(handle);
        }

        Ok(resolved)
    }

    /// NAPTR lookup returning the parsed record set, or `None` for every
    /// flavor of "no records": transport failure, error rcode, unparseable
    /// response, or an answer section without NAPTR records.
    async fn naptr_query(&self, dname: &str) -> Option<RecordSet> {
        let msg = match self.transport.query(dname, RecordType::Naptr).await {
            Ok(msg) => msg,
            Err(e) => {
                error!("NAPTR query for '{}' failed: {}", dname, e);
                return None;
            }
        };

        match Header::parse(&msg) {
            Ok(header) if header.rcode() != 0 => {
                error!("NAPTR query for '{}' answered with rcode {}", dname, header.rcode());
                return None;
            }
            Err(e) => {
                error!("malformed NAPTR response for '{}': {}", dname, e);
                return None;
            }
            Ok(_) => {}
        }

        let records = match RecordSet::from_response(&msg) {
            Ok(records) => records,
            Err(e) => {
                error!("failed to parse NAPTR answers for '{}': {}", dname, e);
                return None;
            }
        };

        if records.is_empty() {
            error!("no NAPTR records returned for '{}'", dname);
            return None;
        }

        Some(records)
    }

    /// Removes every record that does not qualify for this context,
    /// preserving the relative order of survivors.
    fn filter_records(&self, ctx: &ResolverContext, dname: &str, records: &mut RecordSet) {
        let desired_target = format!("x-3gpp-{}", ctx.target);
        let desired_service = format!("x-{}-{}", ctx.interface, ctx.protocol);

        let mut cursor = records.head();
        while let Some(handle) = cursor {
            let next = records.next(handle);
            let remove = {
                let record = records.get(handle).expect("cursor handles are live");
                self.should_remove(record, dname, &desired_target, &desired_service)
            };
            if remove {
                records.remove(handle);
            }
            cursor = next;
        }
    }

    /// One record's filter decision, first matching rule wins:
    ///
    /// 1. remove unless the service field covers both desired tokens;
    /// 2. keep a pure-replacement record (replacement set, no pattern);
    /// 3. keep or remove on the Regexp clause per [`FilterMode`];
    /// 4. remove everything else.
    fn should_remove(
        &self,
        record: &NaptrRecord,
        dname: &str,
        desired_target: &str,
        desired_service: &str,
    ) -> bool {
        if !(record.service.contains(desired_service) && record.service.contains(desired_target)) {
            debug!(
                "excluding record ({}): service does not cover '{}' and '{}'",
                record, desired_target, desired_service
            );
            return true;
        }

        if self.options.drop_invalid_records && !record.valid {
            debug!("excluding record with undecodable replacement ({})", record);
            return true;
        }

        let replacement_only = !record.replacement.is_empty()
            && record.replacement != "."
            && record.regex_pattern.is_empty();
        if replacement_only {
            debug!("keeping record with replacement and no regexp ({})", record);
            return false;
        }

        let pattern_matches = reg_match(&record.regex_pattern, dname);
        let keep = match self.options.filter_mode {
            // NOTE: this is the inverse of the RFC 2915 match rule. Deployed
            // EPC resolvers keep the records whose pattern does NOT match
            // the working domain name, and that behavior is preserved here
            // on purpose; select FilterMode::Rfc2915 for the rule as the RFC
            // states it.
            FilterMode::Legacy => !pattern_matches,
            FilterMode::Rfc2915 => pattern_matches,
        };

        if keep {
            debug!("keeping record on the regexp clause ({})", record);
        } else {
            debug!("excluding record on the regexp clause ({})", record);
        }
        !keep
    }

    /// Issues the record's final lookup: A for flag `'a'` (or no flag), SRV
    /// for `'s'`. Anything else resolves nothing.
    async fn typed_ip_query(&self, flag: Option<char>, dname: &str) -> (usize, Option<Ipv4Addr>) {
        match flag {
            None | Some('a') => self.ip_query(RecordType::A, dname).await,
            Some('s') => self.ip_query(RecordType::Srv, dname).await,
            Some(other) => {
                error!(
                    "unsupported NAPTR flag '{}', only 'a' and 's' lookups are handled",
                    other
                );
                (0, None)
            }
        }
    }

    /// Queries `dname` and scans the answers. Every A answer bumps the count
    /// and overwrites the result, so the last one wins. Every SRV answer has
    /// its target chased with a nested A lookup, depth first in answer
    /// order. SRV priority and weight are not honored.
    fn ip_query<'a>(
        &'a self,
        rtype: RecordType,
        dname: &'a str,
    ) -> BoxFuture<'a, (usize, Option<Ipv4Addr>)> {
        async move {
            let msg = match self.transport.query(dname, rtype).await {
                Ok(msg) => msg,
                Err(e) => {
                    error!("{} query for '{}' failed: {}", rtype, dname, e);
                    return (0, None);
                }
            };
            let response = match Response::parse(&msg) {
                Ok(response) => response,
                Err(e) => {
                    error!("failed to parse {} response for '{}': {}", rtype, dname, e);
                    return (0, None);
                }
            };

            let mut count = 0usize;
            let mut last = None;
            debug!(
                "[{}-lookup] walking {} answers for '{}'",
                rtype,
                response.answers.len(),
                dname
            );

            for answer in &response.answers {
                if answer.rtype == RecordType::A as u16 {
                    if let Some(addr) = wire::a_rdata(&msg, &answer.rdata) {
                        last = Some(addr);
                        count += 1;
                    }
                } else if answer.rtype == RecordType::Srv as u16 {
                    match wire::srv_target(&msg, &answer.rdata) {
                        Ok(target) => {
                            let (sub_count, sub_last) =
                                self.ip_query(RecordType::A, &target).await;
                            count += sub_count;
                            if sub_last.is_some() {
                                last = sub_last;
                            }
                        }
                        Err(e) => {
                            error!("failed to decode SRV target for '{}': {}", dname, e);
                        }
                    }
                }
            }

            (count, last)
        }
        .boxed()
    }

    /// Resolves one peer and packages the outcome for output.
    pub async fn resolve_peer(&self, ctx: &ResolverContext) -> PeerResult {
        let start = Instant::now();

        let domain = match ctx.build_domain_name() {
            Ok(domain) => domain,
            Err(e) => return PeerResult::failed(ctx, String::new(), start, e.to_string()),
        };

        match self.resolve(ctx).await {
            Ok(Some(address)) => PeerResult {
                apn: ctx.apn.clone(),
                target: ctx.target.clone(),
                domain,
                address: Some(address.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
            },
            Ok(None) => PeerResult::failed(ctx, domain, start, "no peer address resolved".into()),
            Err(e) => PeerResult::failed(ctx, domain, start, e.to_string()),
        }
    }

    /// Resolves a batch of APNs from a file, one per line, against this
    /// resolver's base identity.
    ///
    /// Lines are streamed rather than loaded whole; blank lines and lines
    /// starting with `#` are skipped. Results go to `output_file` as JSONL
    /// when given, otherwise to stdout as pretty JSON. `rate_limit` caps the
    /// sustained queries per minute across the batch.
    pub async fn process_batch(
        &self,
        base: &ResolverContext,
        input_file: &Path,
        output_file: Option<&PathBuf>,
        chunk_size: usize,
        rate_limit: u64,
    ) -> Result<()> {
        let mut output_writer = if let Some(path) = output_file {
            Some(
                OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(path)
                    .await
                    .context("failed to create output file")?,
            )
        } else {
            None
        };

        let rate_limiter = Arc::new(batch_query_limiter(
            rate_limit as usize,
            self.concurrent_limit,
        ));

        let file = File::open(input_file)
            .await
            .with_context(|| format!("failed to open APN file: {:?}", input_file))?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        let mut apns_processed = 0usize;
        let mut current_chunk = Vec::with_capacity(chunk_size);
        let mut line = String::new();

        info!("resolving APNs from {} in streaming mode", input_file.display());

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }

            let apn = line.trim();
            if apn.is_empty() || apn.starts_with('#') {
                continue;
            }
            current_chunk.push(apn.to_string());

            if current_chunk.len() >= chunk_size {
                apns_processed += current_chunk.len();
                info!(
                    "resolving chunk of {} APNs ({} total so far)",
                    current_chunk.len(),
                    apns_processed
                );
                let results = self.process_chunk(base, &current_chunk, &rate_limiter).await;
                write_results(&results, &mut output_writer).await?;
                current_chunk.clear();
            }
        }

        if !current_chunk.is_empty() {
            apns_processed += current_chunk.len();
            info!("resolving final chunk of {} APNs", current_chunk.len());
            let results = self.process_chunk(base, &current_chunk, &rate_limiter).await;
            write_results(&results, &mut output_writer).await?;
        }

        info!("batch resolution completed, {} APNs processed", apns_processed);
        Ok(())
    }

    /// Resolves one chunk with bounded concurrency and rate limiting.
    async fn process_chunk(
        &self,
        base: &ResolverContext,
        apns: &[String],
        rate_limiter: &Arc<RateLimiter>,
    ) -> Vec<PeerResult> {
        use futures::{stream, StreamExt};

        stream::iter(apns)
            .map(|apn| {
                let resolver = self.clone();
                let rate_limiter = rate_limiter.clone();
                let mut ctx = base.clone();
                ctx.apn = apn.clone();

                async move {
                    let start = Instant::now();
                    match rate_limiter.acquire().await {
                        Ok(_permit) => {
                            debug!("resolving APN '{}'", ctx.apn);
                            resolver.resolve_peer(&ctx).await
                        }
                        Err(e) => {
                            error!("failed to acquire query permit: {}", e);
                            PeerResult::failed(
                                &ctx,
                                String::new(),
                                start,
                                format!("rate limiting error: {}", e),
                            )
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrent_limit)
            .collect()
            .await
    }
}

impl<T: DnsTransport> Clone for PeerResolver<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            options: self.options.clone(),
            concurrent_limit: self.concurrent_limit,
        }
    }
}

impl PeerResult {
    fn failed(ctx: &ResolverContext, domain: String, start: Instant, error: String) -> Self {
        Self {
            apn: ctx.apn.clone(),
            target: ctx.target.clone(),
            domain,
            address: None,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(error),
        }
    }
}

/// Streams a chunk's results to the output file as JSONL, or to stdout as
/// pretty JSON, flushing after every chunk.
async fn write_results(results: &[PeerResult], output_writer: &mut Option<File>) -> Result<()> {
    for result in results {
        if let Some(writer) = output_writer.as_mut() {
            let json_line = format!("{}\n", serde_json::to_string(result)?);
            writer.write_all(json_line.as_bytes()).await?;
        } else {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    if let Some(writer) = output_writer.as_mut() {
        writer.flush().await?;
    }
    Ok(())
}

/// Applies one record's rewrite to the working domain name.
///
/// A record carrying both halves of a Regexp field rewrites the name through
/// [`reg_replace`]; a failed rewrite is logged and leaves the name untouched
/// for the next candidate. Otherwise any replacement other than `"."` is
/// taken verbatim. A record with neither leaves the name as it stands.
pub fn transform_domain_name(record: &NaptrRecord, dname: &mut String) {
    if !record.regex_pattern.is_empty() && !record.regex_replace.is_empty() {
        match reg_replace(&record.regex_pattern, &record.regex_replace, dname) {
            Some(rewritten) => *dname = rewritten,
            None => error!(
                "failed to apply NAPTR rewrite '{}' on '{}'",
                record.regex_pattern, dname
            ),
        }
    } else if record.replacement != "." {
        *dname = record.replacement.chars().take(MAX_DOMAIN_NAME_LEN).collect();
    }
}
