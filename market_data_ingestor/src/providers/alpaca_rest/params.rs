use serde::{Deserialize, Serialize};

use crate::{
    models::{
        asset::AssetClass,
        request_params::{BarsRequestParams, ProviderParams},
        timeframe::{TimeFrame, TimeFrameUnit},
    },
    providers::{ProviderError, ValidationSnafu},
};

/// Specifies the corporate action adjustment for stock data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Raw,
    Split,
    Dividend,
    All,
}

/// Specifies the source feed for stock data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Sip,
    Iex,
    Otc,
}

/// Alpaca-specific parameters for a bars request.
///
/// Accounts without a market data subscription must ask for the `iex` feed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlpacaBarsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<Adjustment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<Feed>,
}

impl AlpacaBarsParams {
    pub fn is_empty(&self) -> bool {
        self.adjustment.is_none() && self.feed.is_none()
    }
}

impl Adjustment {
    pub fn as_str(self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::Split => "split",
            Adjustment::Dividend => "dividend",
            Adjustment::All => "all",
        }
    }
}

impl Feed {
    pub fn as_str(self) -> &'static str {
        match self {
            Feed::Sip => "sip",
            Feed::Iex => "iex",
            Feed::Otc => "otc",
        }
    }
}

/// Alpaca's timeframe spelling, e.g. `1Day`, `15Min`.
pub fn alpaca_timeframe(tf: &TimeFrame) -> String {
    let unit = match tf.unit {
        TimeFrameUnit::Minute => "Min",
        TimeFrameUnit::Hour => "Hour",
        TimeFrameUnit::Day => "Day",
        TimeFrameUnit::Week => "Week",
        TimeFrameUnit::Month => "Month",
    };
    format!("{}{}", tf.amount, unit)
}

/// Rejects requests the stocks endpoint cannot serve.
pub fn validate_request(params: &BarsRequestParams) -> Result<(), ProviderError> {
    if params.asset_class != AssetClass::UsEquity {
        return ValidationSnafu {
            message: format!(
                "alpaca stock bars do not serve asset class {:?}",
                params.asset_class
            ),
        }
        .fail();
    }
    if params.symbols.is_empty() {
        return ValidationSnafu {
            message: "at least one symbol is required",
        }
        .fail();
    }
    if params.end <= params.start {
        return ValidationSnafu {
            message: format!("empty range {} .. {}", params.start, params.end),
        }
        .fail();
    }
    Ok(())
}

/// Builds the query string for one page request.
pub fn construct_params(params: &BarsRequestParams) -> Vec<(String, String)> {
    let mut q = vec![
        ("symbols".to_string(), params.symbols.join(",")),
        ("timeframe".to_string(), alpaca_timeframe(&params.timeframe)),
        ("start".to_string(), params.start.to_rfc3339()),
        ("end".to_string(), params.end.to_rfc3339()),
    ];

    if let ProviderParams::Alpaca(extra) = &params.provider_specific {
        if let Some(a) = extra.adjustment {
            q.push(("adjustment".to_string(), a.as_str().to_string()));
        }
        if let Some(f) = extra.feed {
            q.push(("feed".to_string(), f.as_str().to_string()));
        }
    }
    q
}
