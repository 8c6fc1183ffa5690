mod cycle;
mod fixtures;
mod mock_ledger;
