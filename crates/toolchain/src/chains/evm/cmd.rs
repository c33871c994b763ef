//! Command builder for Ganache.

/// Builder for Ganache launch arguments.
#[derive(Debug, Clone)]
pub struct GanacheCmdBuilder {
    host: String,
    port: u16,
    accounts: u32,
    default_balance: u64,
    deterministic: bool,
    gas_limit: u64,
    gas_price: u64,
    block_time: u64,
}

impl GanacheCmdBuilder {
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8545,
            accounts: 10,
            default_balance: 1000,
            deterministic: true,
            gas_limit: 12_000_000,
            // 20 gwei
            gas_price: 20_000_000_000,
            block_time: 1,
        }
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the number of pre-funded accounts.
    pub fn accounts(mut self, accounts: u32) -> Self {
        self.accounts = accounts;
        self
    }

    /// Set the starting balance (in ether) of each account.
    pub fn default_balance(mut self, balance: u64) -> Self {
        self.default_balance = balance;
        self
    }

    /// Derive accounts from a fixed seed.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Set the block gas limit.
    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Set the mining interval in seconds.
    pub fn block_time(mut self, block_time: u64) -> Self {
        self.block_time = block_time;
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--port".to_string(),
            self.port.to_string(),
            "--host".to_string(),
            self.host,
            "--accounts".to_string(),
            self.accounts.to_string(),
            "--defaultBalanceEther".to_string(),
            self.default_balance.to_string(),
            "--gasLimit".to_string(),
            self.gas_limit.to_string(),
            "--gasPrice".to_string(),
            self.gas_price.to_string(),
            "--blockTime".to_string(),
            self.block_time.to_string(),
        ];

        if self.deterministic {
            cmd.push("--deterministic".to_string());
        }

        cmd
    }
}

impl Default for GanacheCmdBuilder {
    fn default() -> Self {
        Self::new()
    }
}
