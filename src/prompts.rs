//! Instruction prompt for donation-receipt extraction.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::instruction_prompt`]; the constant here
//! is used only when no override is provided. Unit tests inspect it directly
//! so a schema change that forgets the prompt is caught without a live model.

/// Default instruction sent alongside the receipt images.
///
/// The field names in the OUTPUT FORMAT block must match what
/// [`crate::pipeline::normalize`] looks up.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a highly accurate data extraction assistant. Your task is to extract specific donation details from the provided document image(s).

FIELDS TO EXTRACT:

1. Donor Name
   - Locate the donor's name, typically found in the top section or on a check.
   - Exclude organization names (e.g. "Ambulance Corps"), headers, or form labels.
   - If multiple names are present (e.g. "John & Jane Doe"), include both.

2. Address
   - Extract the full mailing address (Street, City, State, Zip).
   - CRITICAL: the address MUST be a single line string. Replace any line breaks with a comma and a space (e.g. "123 Main St, Anytown, NY 12345").

3. Amount
   - Extract the donation amount in USD.
   - Look for the '$' symbol, "DOLLARS", or "AMOUNT" labels.
   - Format: return as a decimal string (e.g. "25.00").
   - Correction: if you see a large integer like "2500" that clearly represents $25.00, convert it to "25.00".

4. Date
   - Extract the date of the donation.
   - Format: convert to MM/DD/YYYY (e.g. 11/06/2025).

OUTPUT FORMAT:

Return ONLY valid JSON. Do not include markdown formatting (like ```json) or any other text.
For a single donation return one object; if the page clearly records several separate donations, return an array of such objects.

{
  "donor_name": "extracted name or null",
  "address": "single line address string or null",
  "amount": "decimal string or null",
  "date": "MM/DD/YYYY or null"
}"#;
