@@ 1-1 REPLACE
y
@@ END
=== END FILE ===